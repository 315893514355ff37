// store.rs — 天空盒素材的读取 / 规整 / 保存

use image::io::Reader as ImageReader;
use image::{DynamicImage, GenericImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// 处理尺寸上限（与截图导入设置的 maxTextureSize 一致）。
/// 超出的全景图按 Lanczos3 等比缩到限制内。
pub const MAX_TEXTURE_DIM: u32 = 8192;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("frame metadata error: {0}")]
    Meta(#[from] serde_json::Error),
}

/// 解码任意常见格式为 RGBA8。大图不设解码上限（全景图经常超过默认限制）。
pub fn load_image(path: &Path) -> Result<RgbaImage, LoadError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let img = ImageReader::new(reader)
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })?;

    Ok(img.to_rgba8())
}

/// 投影前的规整：
/// - 任一边超过 max_dim 时整体等比缩小；
/// - 高度不足宽度一半时在顶部补黑，把原图贴到底部，凑成 2:1 等矩形。
///   这样 v ∈ [0, 1] 采样时上方自然是黑色天区。
pub fn normalize_panorama(img: RgbaImage, max_dim: u32) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();

    let img = if src_w > max_dim || src_h > max_dim {
        let scale = (max_dim as f32 / src_w.max(src_h) as f32).min(1.0);
        let new_w = (src_w as f32 * scale) as u32;
        let new_h = (src_h as f32 * scale) as u32;
        log::info!("skybox {src_w}x{src_h} exceeds {max_dim}, scaling to {new_w}x{new_h}");
        DynamicImage::ImageRgba8(img)
            .resize(new_w, new_h, image::imageops::FilterType::Lanczos3)
            .to_rgba8()
    } else {
        img
    };

    let (src_w, src_h) = img.dimensions();
    let target_h = src_w / 2;

    if target_h > 0 && src_h < target_h {
        log::info!("skybox {src_w}x{src_h} is not 2:1, padding to {src_w}x{target_h}");
        let mut canvas = RgbaImage::from_pixel(src_w, target_h, Rgba([0, 0, 0, 255]));
        let y_offset = target_h - src_h;
        // y_offset 已保证不会越界，copy_from 不会返回 Err
        let _ = canvas.copy_from(&img, 0, y_offset);
        canvas
    } else {
        img
    }
}

/// 按扩展名编码保存（png / jpg / bmp …，由 image crate 决定）。
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<(), LoadError> {
    img.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_panorama_is_padded_to_two_to_one() {
        let src = RgbaImage::from_pixel(8, 3, Rgba([10, 20, 30, 255]));
        let out = normalize_panorama(src, MAX_TEXTURE_DIM);

        assert_eq!(out.dimensions(), (8, 4));
        // 顶行补黑，原图贴在底部
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(out.get_pixel(0, 1).0, [10, 20, 30, 255]);
        assert_eq!(out.get_pixel(7, 3).0, [10, 20, 30, 255]);
    }

    #[test]
    fn two_to_one_panorama_is_untouched() {
        let src = RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255]));
        let before = src.clone();
        let out = normalize_panorama(src, MAX_TEXTURE_DIM);
        assert_eq!(out.as_raw(), before.as_raw());
    }

    #[test]
    fn oversize_panorama_is_scaled_down() {
        let src = RgbaImage::from_pixel(16, 8, Rgba([200, 200, 200, 255]));
        let out = normalize_panorama(src, 8);
        assert_eq!(out.dimensions(), (8, 4));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_image(Path::new("definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn save_and_reload_round_trip() {
        let path = std::env::temp_dir().join("skybox_patcher_store_roundtrip.png");
        let src = RgbaImage::from_pixel(4, 2, Rgba([1, 2, 3, 255]));

        save_image(&src, &path).unwrap();
        let back = load_image(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.as_raw(), src.as_raw());
    }
}
