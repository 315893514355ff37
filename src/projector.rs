// projector.rs — 核心投影器 (Patch → Equirectangular Skybox)

use crate::camera::CameraParameters;
use glam::{Quat, Vec3};
use image::RgbaImage;
use rayon::prelude::*;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// 全景图经度原点与截图相机 forward 轴之间的固定对齐量：绕 +Y 轴 +90°。
/// 这是全景素材的作者朝向与采集端 forward 约定之间的接缝；
/// 改动它会让补丁整体绕竖直轴偏转。
pub const PANO_YAW_ALIGN: f32 = FRAC_PI_2;

/// Patch 像素 alpha 低于该值时视为完全透明，不参与混合
pub const ALPHA_EPSILON: f32 = 0.001;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ProjectError {
    #[error("missing input reference: {0}")]
    MissingReference(&'static str),

    #[error("{role} must be at least 2x2, got {width}x{height}")]
    InvalidDimensions {
        role: &'static str,
        width: u32,
        height: u32,
    },

    #[error("invalid camera: vfov={vfov} rad, aspect={aspect}")]
    InvalidCamera { vfov: f32, aspect: f32 },
}

/// 投影任务的装配体：三个输入引用 + 混合强度。
/// 字段允许逐个赋值，未赋齐就调用 `project` 会得到 `MissingReference`。
pub struct Projector {
    pub skybox: Option<RgbaImage>,
    pub patch: Option<RgbaImage>,
    pub camera: Option<CameraParameters>,
    pub opacity: f32,
}

impl Default for Projector {
    fn default() -> Self {
        Self {
            skybox: None,
            patch: None,
            camera: None,
            opacity: 1.0,
        }
    }
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把 patch 投影回 skybox。输入不全时立刻失败，skybox 不被改动。
    pub fn project(&mut self) -> Result<(), ProjectError> {
        let patch = self
            .patch
            .as_ref()
            .ok_or(ProjectError::MissingReference("patch"))?;
        let camera = self
            .camera
            .as_ref()
            .ok_or(ProjectError::MissingReference("camera"))?;
        let skybox = self
            .skybox
            .as_mut()
            .ok_or(ProjectError::MissingReference("skybox"))?;

        project_patch(skybox, patch, camera, self.opacity)
    }
}

fn validate_dimensions(role: &'static str, img: &RgbaImage) -> Result<(), ProjectError> {
    let (width, height) = img.dimensions();
    // 归一化除以 (N-1)，任一轴少于 2 个采样即退化
    if width < 2 || height < 2 {
        return Err(ProjectError::InvalidDimensions {
            role,
            width,
            height,
        });
    }
    Ok(())
}

/// 单次全量扫描：对 skybox 的每个像素判定是否落在相机视锥内，
/// 在内则取 patch 最近整数像素，按 alpha·opacity 线性混入。
/// 视锥外的像素保持逐字节不变。
pub fn project_patch(
    skybox: &mut RgbaImage,
    patch: &RgbaImage,
    camera: &CameraParameters,
    opacity: f32,
) -> Result<(), ProjectError> {
    validate_dimensions("skybox", skybox)?;
    validate_dimensions("patch", patch)?;
    if !camera.is_valid() {
        return Err(ProjectError::InvalidCamera {
            vfov: camera.vfov,
            aspect: camera.aspect,
        });
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let (w, h) = skybox.dimensions();
    let (pw, ph) = patch.dimensions();

    let tan_half = camera.tan_half_vfov();
    let max_px = camera.aspect * tan_half;

    // 先做 +90° 经度对齐，再转入相机局部系；两步合成一个四元数，逐像素只乘一次
    let to_camera = camera.orientation.inverse() * Quat::from_rotation_y(PANO_YAW_ALIGN);

    // 行与行之间无数据依赖，按行切给 rayon；写集合天然不相交
    let row_stride = w as usize * 4;
    let painted: u64 = skybox
        .as_mut()
        .par_chunks_mut(row_stride)
        .enumerate()
        .map(|(y, row)| {
            let v = y as f32 / (h - 1) as f32;
            let lat = (v - 0.5) * PI;
            let (sin_lat, cos_lat) = lat.sin_cos();

            let mut painted = 0u64;
            for x in 0..w {
                let u = x as f32 / (w - 1) as f32;
                let lon = (u - 0.5) * TAU;

                // 该全景像素对应的世界方向
                let dir = Vec3::new(lon.sin() * cos_lat, sin_lat, lon.cos() * cos_lat);
                let cam_dir = to_camera * dir;

                // 相机背后 → 跳过
                if cam_dir.z <= 0.0 {
                    continue;
                }

                let px = cam_dir.x / cam_dir.z;
                let py = cam_dir.y / cam_dir.z;

                if px.abs() > max_px || py.abs() > tan_half {
                    continue;
                }

                let u_patch = (px / max_px) * 0.5 + 0.5;
                let v_patch = (py / tan_half) * 0.5 + 0.5;

                if !(0.0..=1.0).contains(&u_patch) || !(0.0..=1.0).contains(&v_patch) {
                    continue;
                }

                // 最近整数像素；min 防住浮点边界，绝不越界
                let sx = ((u_patch * (pw - 1) as f32).floor() as u32).min(pw - 1);
                let sy = ((v_patch * (ph - 1) as f32).floor() as u32).min(ph - 1);
                let src = patch.get_pixel(sx, sy);

                let alpha = src[3] as f32 / 255.0;
                if alpha <= ALPHA_EPSILON {
                    continue;
                }

                let t = alpha * opacity;
                let o = x as usize * 4;
                for c in 0..4 {
                    let dst = row[o + c] as f32 / 255.0;
                    let s = src[c] as f32 / 255.0;
                    row[o + c] = ((dst + (s - dst) * t) * 255.0).round() as u8;
                }
                painted += 1;
            }
            painted
        })
        .sum();

    log::debug!("patch projection touched {painted} of {} pixels", w as u64 * h as u64);

    Ok(())
}
