//! 构建流水线：读取记录、逐层渲染、编码写出，可选输出可视化图像。

use std::path::PathBuf;
use std::time::Instant;

use revgeo_config::{AppConfig, GridConfig};
use revgeo_core::catalog::EntityCatalog;
use revgeo_core::geometry::Viewport;
use revgeo_core::raster::LayeredRaster;
use revgeo_engine::layering::{LayeredIndexBuilder, LevelReport};
use revgeo_engine::raster::ScanlineRasterizer;
use revgeo_io::{CatalogLoader, IndexSummary, ReadStats, TsvRecordLoader, write_index};
use tracing::info;

use crate::errors::FrontendError;

/// 一次构建的输入输出路径。
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub image: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub read: ReadStats,
    pub levels: Vec<LevelReport>,
    pub summary: IndexSummary,
}

pub fn viewport_from_config(grid: &GridConfig) -> Viewport {
    Viewport::new(
        grid.x_range,
        grid.y_range,
        grid.x_shift,
        grid.y_shift,
        grid.resolution,
    )
}

/// 读取输入并渲染全部层级，返回最终栅格。
pub fn render(
    config: &AppConfig,
    options: &BuildOptions,
) -> Result<(ReadStats, Vec<LevelReport>, LayeredRaster), FrontendError> {
    config.validate()?;
    let viewport = viewport_from_config(&config.grid);
    let rasterizer = ScanlineRasterizer::new(config.raster.samples);
    info!(
        width = viewport.width(),
        height = viewport.height(),
        resolution = config.grid.resolution,
        samples = rasterizer.samples(),
        "世界网格"
    );
    let mut builder = LayeredIndexBuilder::new(viewport, rasterizer, config.raster.tile_size)?;

    let mut catalog = EntityCatalog::new(
        config.levels.min,
        config.levels.max,
        config.raster.min_size(config.grid.resolution),
    );
    let read = TsvRecordLoader::new().load_into(&options.input, &mut catalog)?;
    let stats = catalog.stats();
    info!(
        entities = stats.entities,
        rings = stats.rings,
        dropped_level = stats.dropped_level,
        dropped_small = stats.dropped_small,
        min_size = catalog.min_size(),
        "实体目录已建立"
    );

    let levels = builder.render_catalog(&mut catalog);
    Ok((read, levels, builder.finish()))
}

/// 完整构建：渲染、可选可视化、编码写出。
pub fn build_index(config: &AppConfig, options: &BuildOptions) -> Result<BuildReport, FrontendError> {
    let start = Instant::now();
    let (read, levels, raster) = render(config, options)?;

    if let Some(path) = &options.image {
        write_image(&raster, path)?;
    }

    let summary = write_index(&raster, &options.output)?;
    info!(
        output = %options.output.display(),
        entities = summary.entity_count,
        bytes = summary.bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "索引构建完成"
    );
    Ok(BuildReport {
        read,
        levels,
        summary,
    })
}

#[cfg(feature = "visualize")]
fn write_image(raster: &LayeredRaster, path: &std::path::Path) -> Result<(), FrontendError> {
    crate::visualize::write_png(&raster.grid, path)
}

#[cfg(not(feature = "visualize"))]
fn write_image(_raster: &LayeredRaster, _path: &std::path::Path) -> Result<(), FrontendError> {
    Err(FrontendError::VisualizeFeatureDisabled)
}
