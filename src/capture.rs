// capture.rs
//
// File-based stand-in for the screenshot capture service.
// A captured frame is a flat perspective image plus the camera state that
// produced it. The capture side encodes that state in the file name:
//
//   {rx}_{ry}_{rz}_HFOV_{h}_VFOV_{v}_{width}x{height}.jpg
//
// (euler angles and FOVs in rounded degrees). A JSON sidecar next to the
// image (`<frame>.json`, see FrameMeta) takes precedence when present.

use crate::camera::CameraParameters;
use crate::store::{self, LoadError};
use glam::EulerRot;
use image::RgbaImage;
use serde::Deserialize;
use std::path::Path;

/// 截图 + 拍摄它时的相机状态。相机元数据缺失时由调用方决定兜底。
pub struct CapturedFrame {
    pub image: RgbaImage,
    pub camera: Option<CameraParameters>,
}

/// Sidecar metadata (`<frame>.json`). `aspect` falls back to the decoded
/// image's width/height; `euler_deg` is `[x, y, z]` in degrees.
#[derive(Debug, Deserialize)]
pub struct FrameMeta {
    pub vfov_deg: f32,
    #[serde(default)]
    pub aspect: Option<f32>,
    #[serde(default)]
    pub euler_deg: [f32; 3],
}

impl FrameMeta {
    pub fn camera(&self, fallback_aspect: f32) -> CameraParameters {
        let [ex, ey, ez] = self.euler_deg;
        CameraParameters::from_euler_deg(
            ex,
            ey,
            ez,
            self.vfov_deg,
            self.aspect.unwrap_or(fallback_aspect),
        )
    }
}

/// Render the capture side's screenshot file name for a camera + resolution.
pub fn frame_file_name(camera: &CameraParameters, width: u32, height: u32) -> String {
    let (ey, ex, ez) = camera.orientation.to_euler(EulerRot::YXZ);
    format!(
        "{}_{}_{}_HFOV_{}_VFOV_{}_{}x{}.jpg",
        ex.to_degrees().round() as i32,
        ey.to_degrees().round() as i32,
        ez.to_degrees().round() as i32,
        camera.hfov().to_degrees().round() as i32,
        camera.vfov.to_degrees().round() as i32,
        width,
        height
    )
}

/// Recover camera parameters and capture resolution from a screenshot file
/// name. The HFOV token is redundant (it follows from vfov and aspect) and is
/// not read back. Returns None for names not produced by the capture side.
pub fn parse_frame_file_name(name: &str) -> Option<(CameraParameters, u32, u32)> {
    let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
    let parts: Vec<&str> = stem.split('_').collect();

    if parts.len() != 8 || parts[3] != "HFOV" || parts[5] != "VFOV" {
        return None;
    }

    let ex: f32 = parts[0].parse().ok()?;
    let ey: f32 = parts[1].parse().ok()?;
    let ez: f32 = parts[2].parse().ok()?;
    let vfov_deg: f32 = parts[6].parse().ok()?;

    let (w, h) = parts[7].split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }

    let camera = CameraParameters::from_euler_deg(ex, ey, ez, vfov_deg, w as f32 / h as f32);
    Some((camera, w, h))
}

/// 解码截图并尽量恢复相机参数：sidecar 优先，其次文件名。
pub fn load_frame(path: &Path) -> Result<CapturedFrame, LoadError> {
    let image = store::load_image(path)?;
    let (iw, ih) = image.dimensions();
    let fallback_aspect = iw as f32 / ih as f32;

    let meta_path = path.with_extension("json");
    let camera = if meta_path.is_file() {
        let text = std::fs::read_to_string(&meta_path)?;
        let meta: FrameMeta = serde_json::from_str(&text)?;
        Some(meta.camera(fallback_aspect))
    } else {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_frame_file_name)
            .map(|(camera, w, h)| {
                if (w, h) != (iw, ih) {
                    log::warn!("frame {path:?} is {iw}x{ih} but its name says {w}x{h}");
                }
                camera
            })
    };

    Ok(CapturedFrame { image, camera })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use image::Rgba;

    #[test]
    fn file_name_round_trips_through_parse() {
        let cam = CameraParameters::from_euler_deg(30.0, 90.0, 0.0, 60.0, 1920.0 / 1080.0);
        let name = frame_file_name(&cam, 1920, 1080);

        let (parsed, w, h) = parse_frame_file_name(&name).expect("own name must parse");
        assert_eq!((w, h), (1920, 1080));
        assert!((parsed.vfov - cam.vfov).abs() < 1e-4);
        assert!((parsed.aspect - cam.aspect).abs() < 1e-4);
        assert!(parsed.orientation.abs_diff_eq(cam.orientation, 1e-4));
    }

    #[test]
    fn parse_accepts_the_capture_naming_scheme() {
        let (cam, w, h) =
            parse_frame_file_name("30_90_0_HFOV_106_VFOV_70_1920x1080.jpg").unwrap();
        assert_eq!((w, h), (1920, 1080));
        assert!((cam.vfov.to_degrees() - 70.0).abs() < 1e-4);
        assert!((cam.aspect - 1920.0 / 1080.0).abs() < 1e-5);
    }

    #[test]
    fn parse_accepts_negative_angles() {
        let (cam, _, _) = parse_frame_file_name("-10_350_0_HFOV_90_VFOV_59_64x64.jpg").unwrap();
        assert!(cam.is_valid());
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert!(parse_frame_file_name("sunset.png").is_none());
        assert!(parse_frame_file_name("1_2_HFOV_3.jpg").is_none());
        assert!(parse_frame_file_name("30_90_0_VFOV_59_HFOV_90_64x64.jpg").is_none());
        assert!(parse_frame_file_name("30_90_0_HFOV_90_VFOV_59_0x100.jpg").is_none());
        assert!(parse_frame_file_name("30_90_0_HFOV_90_VFOV_59_64x.jpg").is_none());
    }

    #[test]
    fn meta_aspect_falls_back_to_image_ratio() {
        let meta: FrameMeta =
            serde_json::from_str(r#"{ "vfov_deg": 45.0, "euler_deg": [0.0, 180.0, 0.0] }"#)
                .unwrap();
        let cam = meta.camera(2.0);
        assert!((cam.aspect - 2.0).abs() < 1e-6);
        assert!((cam.vfov.to_degrees() - 45.0).abs() < 1e-4);
    }

    #[test]
    fn load_frame_reads_camera_from_file_name() {
        let dir = std::env::temp_dir();
        let path = dir.join("0_0_0_HFOV_90_VFOV_90_4x4.png");
        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        store::save_image(&img, &path).unwrap();

        let frame = load_frame(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let cam = frame.camera.expect("camera from file name");
        assert!((cam.vfov.to_degrees() - 90.0).abs() < 1e-4);
        assert!(cam.orientation.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn load_frame_prefers_sidecar_metadata() {
        let dir = std::env::temp_dir();
        let path = dir.join("0_0_0_HFOV_90_VFOV_90_4x4_sidecar.png");
        let meta_path = path.with_extension("json");

        let img = RgbaImage::from_pixel(4, 4, Rgba([9, 9, 9, 255]));
        store::save_image(&img, &path).unwrap();
        std::fs::write(&meta_path, r#"{ "vfov_deg": 33.0 }"#).unwrap();

        let frame = load_frame(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&meta_path);

        let cam = frame.camera.expect("camera from sidecar");
        assert!((cam.vfov.to_degrees() - 33.0).abs() < 1e-4);
    }
}
