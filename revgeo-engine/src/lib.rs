pub mod raster;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("viewport has an empty pixel grid ({width}x{height})")]
        EmptyGrid { width: usize, height: usize },
        #[error("grid {width}x{height} exceeds the 65535 pixel limit per axis")]
        GridTooLarge { width: usize, height: usize },
        #[error("tile size must be positive")]
        InvalidTileSize,
    }
}

pub mod layering {
    use std::collections::HashMap;
    use std::time::Instant;

    use glam::DVec2;
    use rayon::prelude::*;
    use revgeo_core::catalog::{Entity, EntityCatalog, LevelCatalog};
    use revgeo_core::format::MAX_DIMENSION;
    use revgeo_core::geometry::{PixelWindow, Viewport};
    use revgeo_core::raster::{LabelChain, LayeredRaster, WinnerGrid};
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::raster::{CoverageRasterizer, ScanlineRasterizer};

    /// 覆盖率低于约 10% 的像素直接忽略。
    pub const NOISE_FLOOR_ALPHA: u8 = 0x19;
    /// alpha 截断到非负字节范围，127 视为完全覆盖。
    pub const MAX_ALPHA: u8 = 0x7F;
    pub const DEFAULT_TILE_SIZE: usize = 256;

    /// 覆盖率转换为 0..=255 的整数 alpha。
    #[inline]
    pub fn coverage_to_alpha(coverage: f32) -> u8 {
        (coverage.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    /// 像素归属判定：返回应写入的新 alpha；`None` 表示当前实体不占有该像素。
    ///
    /// 使用 `>=` 比较：同层中后处理（更小）的实体在平局时胜出。
    #[inline]
    pub fn resolve_pixel(alpha: u8, stored: u8) -> Option<u8> {
        if alpha < NOISE_FLOOR_ALPHA {
            return None;
        }
        let alpha = alpha.min(MAX_ALPHA);
        if alpha == MAX_ALPHA || (alpha > 0 && alpha >= stored) {
            Some(alpha)
        } else {
            None
        }
    }

    /// 在下层值的频次表中选出出现最多者，频次相同时取较小值；0 表示无父级。
    pub fn pick_parent(tally: &HashMap<u32, u32>) -> Option<u32> {
        let mut best: Option<(u32, u32)> = None;
        for (&value, &count) in tally {
            best = match best {
                Some((b_value, b_count))
                    if count < b_count || (count == b_count && value > b_value) =>
                {
                    Some((b_value, b_count))
                }
                _ => Some((value, count)),
            };
        }
        best.map(|(value, _)| value).filter(|&value| value > 0)
    }

    /// 单层渲染结果摘要。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LevelReport {
        pub level: u32,
        pub entities: usize,
        pub first_number: u32,
        pub with_parent: usize,
    }

    /// 逐层（由粗到细）渲染实体并维护全局归属栅格与标签链。
    ///
    /// 实体编号跨层单调递增，从 1 开始，0 保留给“无区域”。
    pub struct LayeredIndexBuilder<R: CoverageRasterizer = ScanlineRasterizer> {
        viewport: Viewport,
        rasterizer: R,
        tile_size: usize,
        global: WinnerGrid,
        scratch: WinnerGrid,
        alphas: Vec<u8>,
        labels: Vec<LabelChain>,
    }

    impl LayeredIndexBuilder<ScanlineRasterizer> {
        pub fn with_defaults(viewport: Viewport) -> Result<Self, EngineError> {
            Self::new(viewport, ScanlineRasterizer::default(), DEFAULT_TILE_SIZE)
        }
    }

    impl<R: CoverageRasterizer> LayeredIndexBuilder<R> {
        pub fn new(viewport: Viewport, rasterizer: R, tile_size: usize) -> Result<Self, EngineError> {
            let (width, height) = (viewport.width(), viewport.height());
            if width == 0 || height == 0 {
                return Err(EngineError::EmptyGrid { width, height });
            }
            if width > MAX_DIMENSION || height > MAX_DIMENSION {
                return Err(EngineError::GridTooLarge { width, height });
            }
            if tile_size == 0 {
                return Err(EngineError::InvalidTileSize);
            }
            Ok(Self {
                viewport,
                rasterizer,
                tile_size,
                global: WinnerGrid::new(width, height),
                scratch: WinnerGrid::new(width, height),
                alphas: vec![0; width * height],
                labels: vec![LabelChain::empty()],
            })
        }

        /// 下一个待分配的实体编号。
        #[inline]
        pub fn next_number(&self) -> u32 {
            self.labels.len() as u32
        }

        /// 按层级升序渲染整个目录，每层渲染后即释放。
        pub fn render_catalog(&mut self, catalog: &mut EntityCatalog) -> Vec<LevelReport> {
            let start = Instant::now();
            let mut reports = Vec::new();
            for level in catalog.levels() {
                let Some(entities) = catalog.take_level(level) else {
                    continue;
                };
                if entities.is_empty() {
                    continue;
                }
                info!(level, entities = entities.len(), "渲染层级");
                reports.push(self.render_level(level, entities));
            }
            info!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                entities = self.labels.len() - 1,
                "渲染完成"
            );
            reports
        }

        /// 渲染单个层级并执行 flatten。
        pub fn render_level(&mut self, level: u32, entities: LevelCatalog) -> LevelReport {
            let first = self.next_number();
            if entities.is_empty() {
                return LevelReport {
                    level,
                    entities: 0,
                    first_number: first,
                    with_parent: 0,
                };
            }

            self.scratch.clear();
            self.alphas.fill(0);

            for entity in entities.into_size_order() {
                if entity.polygons().is_empty() {
                    continue;
                }
                let number = self.next_number();
                self.rasterize_entity(&entity, number);
                self.labels.push(LabelChain::new(entity.key()));
            }

            let with_parent = self.flatten(first);
            let report = LevelReport {
                level,
                entities: (self.next_number() - first) as usize,
                first_number: first,
                with_parent,
            };
            debug!(
                level,
                entities = report.entities,
                with_parent = report.with_parent,
                "层级已合并"
            );
            report
        }

        fn rasterize_entity(&mut self, entity: &Entity, number: u32) {
            let window = self.viewport.window_for(entity.bounds());
            if window.is_empty() {
                return;
            }
            let tiles = window.tiles(self.tile_size);
            // 分批并行光栅化，限制同时驻留的覆盖率缓冲区数量。
            let batch = rayon::current_num_threads().max(1);
            for chunk in tiles.chunks(batch) {
                let rendered: Vec<(PixelWindow, Vec<f32>)> = chunk
                    .par_iter()
                    .map(|tile| {
                        let coverage =
                            render_tile(&self.viewport, &self.rasterizer, entity.polygons(), tile);
                        (*tile, coverage)
                    })
                    .collect();
                for (tile, coverage) in rendered {
                    transfer_pixels(&mut self.scratch, &mut self.alphas, &tile, &coverage, number);
                }
            }
        }

        /// 推断本层实体的父级并把本层结果写入全局栅格。
        fn flatten(&mut self, first: u32) -> usize {
            let introduced = self.labels.len() - first as usize;
            let mut tallies: Vec<HashMap<u32, u32>> = vec![HashMap::new(); introduced];
            for (&id, &below) in self.scratch.cells().iter().zip(self.global.cells()) {
                if id > 0 {
                    *tallies[(id - first) as usize].entry(below).or_insert(0) += 1;
                }
            }

            let (older, newer) = self.labels.split_at_mut(first as usize);
            let mut with_parent = 0;
            for (chain, tally) in newer.iter_mut().zip(&tallies) {
                if let Some(parent) = pick_parent(tally) {
                    chain.append_parent(&older[parent as usize]);
                    with_parent += 1;
                }
            }

            for (cell, &id) in self.global.cells_mut().iter_mut().zip(self.scratch.cells()) {
                if id > 0 {
                    *cell = id;
                }
            }
            with_parent
        }

        pub fn finish(self) -> LayeredRaster {
            LayeredRaster {
                viewport: self.viewport,
                grid: self.global,
                labels: self.labels,
            }
        }
    }

    fn render_tile<R: CoverageRasterizer>(
        viewport: &Viewport,
        rasterizer: &R,
        polygons: &[Vec<glam::Vec2>],
        tile: &PixelWindow,
    ) -> Vec<f32> {
        let origin = DVec2::new(tile.x_min as f64, tile.y_min as f64);
        let rings: Vec<Vec<DVec2>> = polygons
            .iter()
            .map(|ring| {
                ring.iter()
                    .map(|vertex| {
                        DVec2::new(
                            viewport.proj_lon(vertex.x as f64),
                            viewport.proj_lat(vertex.y as f64),
                        ) - origin
                    })
                    .collect()
            })
            .collect();
        rasterizer.coverage(&rings, tile.width(), tile.height())
    }

    fn transfer_pixels(
        scratch: &mut WinnerGrid,
        alphas: &mut [u8],
        tile: &PixelWindow,
        coverage: &[f32],
        number: u32,
    ) {
        let width = scratch.width();
        let tile_width = tile.width();
        for (py, y) in (tile.y_min..tile.y_max).enumerate() {
            for (px, x) in (tile.x_min..tile.x_max).enumerate() {
                let alpha = coverage_to_alpha(coverage[py * tile_width + px]);
                let index = y * width + x;
                if let Some(alpha) = resolve_pixel(alpha, alphas[index]) {
                    alphas[index] = alpha;
                    scratch.cells_mut()[index] = number;
                }
            }
        }
    }

}
