use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use revgeo_core::raster::WinnerGrid;
use tracing::info;

use crate::errors::FrontendError;

/// 实体编号到颜色的稳定映射；0 号（无归属）为黑色。
pub fn entity_colour(entity: u32) -> [u8; 3] {
    if entity == 0 {
        return [0, 0, 0];
    }
    // splitmix32 风格的混合，让相邻编号颜色差异明显。
    let mut h = entity.wrapping_mul(0x9E37_79B9);
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    let [r, g, b, _] = h.to_be_bytes();
    // 避免与背景混淆。
    [r | 0x20, g | 0x20, b | 0x20]
}

/// 把归属栅格渲染成彩色图像，北方朝上。
pub fn render_grid(grid: &WinnerGrid) -> RgbImage {
    RgbImage::from_fn(grid.width() as u32, grid.height() as u32, |x, y| {
        Rgb(entity_colour(grid.get(x as usize, y as usize)))
    })
}

/// 将归属栅格写为 PNG。
pub fn write_png(grid: &WinnerGrid, path: &Path) -> Result<(), FrontendError> {
    render_grid(grid)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|err| FrontendError::Image {
            path: path.to_path_buf(),
            source: Box::new(err),
        })?;
    info!(path = %path.display(), width = grid.width(), height = grid.height(), "可视化图像已写出");
    Ok(())
}
