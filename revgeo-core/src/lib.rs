pub mod geometry {
    use glam::DVec2;

    /// 经纬度包围盒（单位：度），内部以 `glam::DVec2` 保存最小/最大角点。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct BoundingBox {
        min: DVec2,
        max: DVec2,
    }

    impl BoundingBox {
        #[inline]
        pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
            Self {
                min: DVec2::new(lon_min, lat_min),
                max: DVec2::new(lon_max, lat_max),
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self {
                min: DVec2::splat(f64::INFINITY),
                max: DVec2::splat(f64::NEG_INFINITY),
            }
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.min.x > self.max.x || self.min.y > self.max.y
        }

        #[inline]
        pub fn reset(&mut self) {
            *self = Self::empty();
        }

        #[inline]
        pub fn lon_min(&self) -> f64 {
            self.min.x
        }

        #[inline]
        pub fn lon_max(&self) -> f64 {
            self.max.x
        }

        #[inline]
        pub fn lat_min(&self) -> f64 {
            self.min.y
        }

        #[inline]
        pub fn lat_max(&self) -> f64 {
            self.max.y
        }

        pub fn update(&mut self, lon: f64, lat: f64) {
            let point = DVec2::new(lon, lat);
            if self.is_empty() {
                self.min = point;
                self.max = point;
                return;
            }
            self.min = self.min.min(point);
            self.max = self.max.max(point);
        }

        /// 与另一个包围盒求并。
        pub fn include_box(&mut self, other: &BoundingBox) {
            if other.is_empty() {
                return;
            }
            self.update(other.min.x, other.min.y);
            self.update(other.max.x, other.max.y);
        }

        /// 面积近似值 `(lonmax-lonmin) * (latmax-latmin)`，只用于相对排序，不是测地面积。
        /// 空盒子没有定义尺寸，返回 NaN。
        pub fn size(&self) -> f64 {
            if self.is_empty() {
                return f64::NAN;
            }
            let extent = self.max - self.min;
            extent.x * extent.y
        }
    }

    impl Default for BoundingBox {
        fn default() -> Self {
            Self::empty()
        }
    }

    /// 像素窗口，半开区间 `[x_min, x_max) × [y_min, y_max)`。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PixelWindow {
        pub x_min: usize,
        pub x_max: usize,
        pub y_min: usize,
        pub y_max: usize,
    }

    impl PixelWindow {
        #[inline]
        pub fn new(x_min: usize, x_max: usize, y_min: usize, y_max: usize) -> Self {
            Self {
                x_min,
                x_max,
                y_min,
                y_max,
            }
        }

        #[inline]
        pub fn width(&self) -> usize {
            self.x_max.saturating_sub(self.x_min)
        }

        #[inline]
        pub fn height(&self) -> usize {
            self.y_max.saturating_sub(self.y_min)
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.width() == 0 || self.height() == 0
        }

        /// 按固定边长切分为若干瓦片，行优先（先 x 后 y 与光栅化顺序一致）。
        pub fn tiles(&self, tile_size: usize) -> Vec<PixelWindow> {
            let step = tile_size.max(1);
            let mut tiles = Vec::new();
            if self.is_empty() {
                return tiles;
            }
            for x1 in (self.x_min..self.x_max).step_by(step) {
                let x2 = (x1 + step).min(self.x_max);
                for y1 in (self.y_min..self.y_max).step_by(step) {
                    let y2 = (y1 + step).min(self.y_max);
                    tiles.push(PixelWindow::new(x1, x2, y1, y2));
                }
            }
            tiles
        }
    }

    /// 等距圆柱投影参数。构建后只读，可在线程间共享。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct Viewport {
        x_range: f64,
        y_range: f64,
        x_shift: f64,
        y_shift: f64,
        x_cover: f64,
        y_cover: f64,
        width: usize,
        height: usize,
    }

    impl Viewport {
        /// 以统一分辨率（度/像素）构建视口。
        ///
        /// 范围不是分辨率整数倍时，实际范围取 `像素数 * 分辨率`，
        /// 使 `from_extent(x_range, .., width, ..)` 还原出同一投影。
        pub fn new(x_range: f64, y_range: f64, x_shift: f64, y_shift: f64, resolution: f64) -> Self {
            // 0.01 等分辨率无法精确表示，四舍五入避免 179.99999 被截断成少一行。
            let width = (x_range / resolution).round().max(0.0) as usize;
            let height = (y_range / resolution).round().max(0.0) as usize;
            Self {
                x_range: width as f64 * resolution,
                y_range: height as f64 * resolution,
                x_shift,
                y_shift,
                x_cover: resolution,
                y_cover: resolution,
                width,
                height,
            }
        }

        /// 由世界范围与像素尺寸反推每像素覆盖度，供索引加载时使用。
        pub fn from_extent(
            x_range: f64,
            y_range: f64,
            x_shift: f64,
            y_shift: f64,
            width: usize,
            height: usize,
        ) -> Self {
            let x_cover = if width > 0 { x_range / width as f64 } else { f64::NAN };
            let y_cover = if height > 0 { y_range / height as f64 } else { f64::NAN };
            Self {
                x_range,
                y_range,
                x_shift,
                y_shift,
                x_cover,
                y_cover,
                width,
                height,
            }
        }

        /// 全球 0.01° 网格，与默认配置一致。
        pub fn world(resolution: f64) -> Self {
            Self::new(360.0, 180.0, 180.0, 90.0, resolution)
        }

        #[inline]
        pub fn width(&self) -> usize {
            self.width
        }

        #[inline]
        pub fn height(&self) -> usize {
            self.height
        }

        #[inline]
        pub fn x_range(&self) -> f64 {
            self.x_range
        }

        #[inline]
        pub fn y_range(&self) -> f64 {
            self.y_range
        }

        #[inline]
        pub fn x_shift(&self) -> f64 {
            self.x_shift
        }

        #[inline]
        pub fn y_shift(&self) -> f64 {
            self.y_shift
        }

        #[inline]
        pub fn x_cover(&self) -> f64 {
            self.x_cover
        }

        #[inline]
        pub fn y_cover(&self) -> f64 {
            self.y_cover
        }

        #[inline]
        pub fn proj_lon(&self, lon: f64) -> f64 {
            (lon + self.x_shift) / self.x_cover
        }

        /// 纬度向上增长，栅格行向下增长，因此 y 轴翻转。
        #[inline]
        pub fn proj_lat(&self, lat: f64) -> f64 {
            (self.y_shift - lat) / self.y_cover
        }

        /// 返回坐标所在像素；落在网格外时返回 `None`。
        pub fn pixel_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
            let x = self.proj_lon(lon).floor();
            let y = self.proj_lat(lat).floor();
            if !(x >= 0.0 && y >= 0.0) {
                return None;
            }
            let (x, y) = (x as usize, y as usize);
            if x >= self.width || y >= self.height {
                return None;
            }
            Some((x, y))
        }

        /// 覆盖包围盒的像素窗口，四周各向外多取一个像素以免边缘缺口。
        pub fn window_for(&self, bounds: &BoundingBox) -> PixelWindow {
            if bounds.is_empty() {
                return PixelWindow::new(0, 0, 0, 0);
            }
            let clamp_x = |v: f64| v.clamp(0.0, self.width as f64) as usize;
            let clamp_y = |v: f64| v.clamp(0.0, self.height as f64) as usize;
            PixelWindow::new(
                clamp_x(self.proj_lon(bounds.lon_min()).floor() - 1.0),
                clamp_x(self.proj_lon(bounds.lon_max()).ceil() + 1.0),
                clamp_y(self.proj_lat(bounds.lat_max()).floor() - 1.0),
                clamp_y(self.proj_lat(bounds.lat_min()).ceil() + 1.0),
            )
        }
    }
}

pub mod catalog {
    use std::collections::HashMap;
    use std::ops::RangeInclusive;

    use glam::Vec2;

    use crate::geometry::BoundingBox;
    use crate::raster::SEGMENT_SENTINEL;

    pub const DEFAULT_MIN_LEVEL: u32 = 2;
    pub const DEFAULT_MAX_LEVEL: u32 = 10;

    /// 闭合环，顶点为 (经度, 纬度)。
    pub type Ring = Vec<Vec2>;

    /// 解析器输出的一条记录：一个层级、一个标签和一个多边形环。
    #[derive(Debug, Clone, PartialEq)]
    pub struct Record {
        pub level: u32,
        pub label: String,
        pub ring: Ring,
    }

    impl Record {
        /// 标签中的分隔哨兵会被剔除，保证序列化后的标签链可以无歧义拆分。
        pub fn new(level: u32, label: impl Into<String>, ring: Ring) -> Self {
            let mut label = label.into();
            if label.contains(SEGMENT_SENTINEL) {
                label.retain(|ch| ch != SEGMENT_SENTINEL);
            }
            Self { level, label, ring }
        }

        pub fn bounds(&self) -> BoundingBox {
            let mut bounds = BoundingBox::empty();
            for vertex in &self.ring {
                bounds.update(vertex.x as f64, vertex.y as f64);
            }
            bounds
        }
    }

    /// 某一层级上的一个行政区。身份只由 `key` 决定。
    #[derive(Debug, Clone)]
    pub struct Entity {
        key: String,
        bounds: BoundingBox,
        polygons: Vec<Ring>,
    }

    impl Entity {
        pub fn new(key: impl Into<String>, ring: Ring, bounds: BoundingBox) -> Self {
            Self {
                key: key.into(),
                bounds,
                polygons: vec![ring],
            }
        }

        #[inline]
        pub fn key(&self) -> &str {
            &self.key
        }

        #[inline]
        pub fn bounds(&self) -> &BoundingBox {
            &self.bounds
        }

        #[inline]
        pub fn polygons(&self) -> &[Ring] {
            &self.polygons
        }

        /// 合并同名实体的又一个环，这是实体创建后唯一的修改途径。
        fn absorb(&mut self, ring: Ring, bounds: &BoundingBox) {
            self.bounds.include_box(bounds);
            self.polygons.push(ring);
        }
    }

    impl PartialEq for Entity {
        fn eq(&self, other: &Self) -> bool {
            self.key == other.key
        }
    }

    impl Eq for Entity {}

    /// 单个层级的实体集合，按 key 去重。
    #[derive(Debug, Default)]
    pub struct LevelCatalog {
        entities: HashMap<String, Entity>,
    }

    impl LevelCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.entities.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.entities.is_empty()
        }

        pub fn get(&self, key: &str) -> Option<&Entity> {
            self.entities.get(key)
        }

        /// 插入一个环，返回是否新建了实体。
        fn insert_ring(&mut self, key: String, ring: Ring, bounds: BoundingBox) -> bool {
            match self.entities.get_mut(&key) {
                Some(existing) => {
                    existing.absorb(ring, &bounds);
                    false
                }
                None => {
                    let entity = Entity::new(key.clone(), ring, bounds);
                    self.entities.insert(key, entity);
                    true
                }
            }
        }

        /// 按包围盒面积降序消费实体；面积相同时按 key 升序，保证编号稳定。
        pub fn into_size_order(self) -> Vec<Entity> {
            let mut order: Vec<Entity> = self.entities.into_values().collect();
            order.sort_by(|a, b| {
                b.bounds
                    .size()
                    .total_cmp(&a.bounds.size())
                    .then_with(|| a.key.cmp(&b.key))
            });
            order
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum IngestOutcome {
        Created,
        Merged,
        LevelOutOfRange,
        Empty,
        BelowMinimumSize,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CatalogStats {
        pub entities: usize,
        pub rings: usize,
        pub dropped_level: usize,
        pub dropped_empty: usize,
        pub dropped_small: usize,
    }

    /// 所有受支持层级的实体目录。
    #[derive(Debug)]
    pub struct EntityCatalog {
        min_level: u32,
        max_level: u32,
        min_size: f64,
        levels: Vec<Option<LevelCatalog>>,
        stats: CatalogStats,
    }

    impl EntityCatalog {
        /// `min_size` 为环包围盒面积阈值，低于该值的环在当前分辨率下不可见。
        pub fn new(min_level: u32, max_level: u32, min_size: f64) -> Self {
            let count = if max_level >= min_level {
                (max_level - min_level + 1) as usize
            } else {
                0
            };
            Self {
                min_level,
                max_level,
                min_size,
                levels: (0..count).map(|_| Some(LevelCatalog::new())).collect(),
                stats: CatalogStats::default(),
            }
        }

        #[inline]
        pub fn levels(&self) -> RangeInclusive<u32> {
            self.min_level..=self.max_level
        }

        #[inline]
        pub fn min_size(&self) -> f64 {
            self.min_size
        }

        #[inline]
        pub fn stats(&self) -> CatalogStats {
            self.stats
        }

        fn slot(&self, level: u32) -> Option<usize> {
            if level < self.min_level || level > self.max_level {
                None
            } else {
                Some((level - self.min_level) as usize)
            }
        }

        pub fn ingest(&mut self, record: Record) -> IngestOutcome {
            let Some(slot) = self.slot(record.level) else {
                self.stats.dropped_level += 1;
                return IngestOutcome::LevelOutOfRange;
            };
            if record.ring.is_empty() {
                self.stats.dropped_empty += 1;
                return IngestOutcome::Empty;
            }
            let bounds = record.bounds();
            if bounds.size() < self.min_size {
                self.stats.dropped_small += 1;
                return IngestOutcome::BelowMinimumSize;
            }
            let Some(level) = self.levels[slot].as_mut() else {
                // 该层已被渲染阶段取走。
                self.stats.dropped_level += 1;
                return IngestOutcome::LevelOutOfRange;
            };
            self.stats.rings += 1;
            if level.insert_ring(record.label, record.ring, bounds) {
                self.stats.entities += 1;
                IngestOutcome::Created
            } else {
                IngestOutcome::Merged
            }
        }

        pub fn level(&self, level: u32) -> Option<&LevelCatalog> {
            self.slot(level).and_then(|slot| self.levels[slot].as_ref())
        }

        /// 取走某层的实体，渲染完该层后即可释放内存。
        pub fn take_level(&mut self, level: u32) -> Option<LevelCatalog> {
            let slot = self.slot(level)?;
            self.levels[slot].take()
        }
    }
}

pub mod raster {
    use crate::geometry::Viewport;

    /// 标签链各段之间的分隔字节。
    pub const SEGMENT_SENTINEL: char = '\0';

    /// 每个像素的归属实体编号，0 表示无归属。
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct WinnerGrid {
        width: usize,
        height: usize,
        cells: Vec<u32>,
    }

    impl WinnerGrid {
        pub fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                cells: vec![0; width * height],
            }
        }

        /// 由行优先数据构建，长度不符时返回 `None`。
        pub fn from_cells(width: usize, height: usize, cells: Vec<u32>) -> Option<Self> {
            if cells.len() != width * height {
                return None;
            }
            Some(Self {
                width,
                height,
                cells,
            })
        }

        #[inline]
        pub fn width(&self) -> usize {
            self.width
        }

        #[inline]
        pub fn height(&self) -> usize {
            self.height
        }

        #[inline]
        pub fn get(&self, x: usize, y: usize) -> u32 {
            self.cells[y * self.width + x]
        }

        #[inline]
        pub fn set(&mut self, x: usize, y: usize, value: u32) {
            self.cells[y * self.width + x] = value;
        }

        #[inline]
        pub fn row(&self, y: usize) -> &[u32] {
            let start = y * self.width;
            &self.cells[start..start + self.width]
        }

        #[inline]
        pub fn cells(&self) -> &[u32] {
            &self.cells
        }

        #[inline]
        pub fn cells_mut(&mut self) -> &mut [u32] {
            &mut self.cells
        }

        pub fn clear(&mut self) {
            self.cells.fill(0);
        }

        pub fn rows(&self) -> impl Iterator<Item = &[u32]> + '_ {
            self.cells.chunks(self.width.max(1)).take(self.height)
        }
    }

    /// 从最细到最粗排列的区域标签链。
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct LabelChain {
        segments: Vec<String>,
    }

    impl LabelChain {
        pub fn new(label: impl Into<String>) -> Self {
            Self {
                segments: vec![label.into()],
            }
        }

        #[inline]
        pub fn empty() -> Self {
            Self::default()
        }

        #[inline]
        pub fn segments(&self) -> &[String] {
            &self.segments
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.segments.is_empty()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.segments.len()
        }

        /// 将父级（可能已扩展过的）链追加到末尾。
        pub fn append_parent(&mut self, parent: &LabelChain) {
            self.segments.extend(parent.segments.iter().cloned());
        }

        /// 序列化为每段以哨兵结尾的 UTF-8 字节串；空链为空串。
        pub fn to_wire_bytes(&self) -> Vec<u8> {
            let mut out = Vec::with_capacity(self.segments.iter().map(|s| s.len() + 1).sum());
            for segment in &self.segments {
                out.extend_from_slice(segment.as_bytes());
                out.push(SEGMENT_SENTINEL as u8);
            }
            out
        }

        /// 每段以哨兵结尾，只去掉最后一个哨兵之后的空尾；空串为空链。
        pub fn from_wire(text: &str) -> Self {
            if text.is_empty() {
                return Self::empty();
            }
            let body = text.strip_suffix(SEGMENT_SENTINEL).unwrap_or(text);
            Self {
                segments: body.split(SEGMENT_SENTINEL).map(str::to_string).collect(),
            }
        }
    }

    impl<S: Into<String>> FromIterator<S> for LabelChain {
        fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
            Self {
                segments: iter.into_iter().map(Into::into).collect(),
            }
        }
    }

    /// 分层渲染的最终结果：全局归属栅格及按实体编号索引的标签链（下标 0 为空链）。
    #[derive(Debug, Clone)]
    pub struct LayeredRaster {
        pub viewport: Viewport,
        pub grid: WinnerGrid,
        pub labels: Vec<LabelChain>,
    }
}

pub mod format {
    /// 文件头魔数。
    pub const INDEX_MAGIC: u32 = 0x6E06_E000;
    /// 稠密编号数量上限（u16 计数）。
    pub const MAX_ENTITIES: usize = 0xFFFF;
    /// 单个游程最多覆盖的像素数。
    pub const MAX_RUN: usize = 256;
    /// 单条标签链的字节长度上限（不含）。
    pub const MAX_LABEL_CHAIN_BYTES: usize = 0x8000;
    /// 单行编码后的字节长度上限（u16 行长表）。
    pub const MAX_ROW_BYTES: usize = 0xFFFF;
    /// 网格每个维度的像素上限（u16）。
    pub const MAX_DIMENSION: usize = 0xFFFF;
    /// 每个游程的字节数：u16 稠密编号 + u8 (长度-1)。
    pub const RUN_BYTES: usize = 3;
    /// 固定头部长度（魔数、宽高、四个浮点参数、实体数）。
    pub const HEADER_BYTES: usize = 26;
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::catalog::{EntityCatalog, IngestOutcome, Record};
    use super::geometry::{BoundingBox, PixelWindow, Viewport};
    use super::raster::{LabelChain, WinnerGrid};

    fn square(lon: f32, lat: f32, size: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(lon, lat),
            Vec2::new(lon + size, lat),
            Vec2::new(lon + size, lat + size),
            Vec2::new(lon, lat + size),
        ]
    }

    #[test]
    fn bounding_box_tracks_points_and_union() {
        let mut bb = BoundingBox::empty();
        assert!(bb.is_empty());
        assert!(bb.size().is_nan());

        bb.update(10.0, 40.0);
        bb.update(12.0, 43.0);
        assert!(!bb.is_empty());
        assert!((bb.size() - 6.0).abs() < 1e-12);

        let other = BoundingBox::new(-1.0, 0.0, 50.0, 51.0);
        bb.include_box(&other);
        assert_eq!(bb.lon_min(), -1.0);
        assert_eq!(bb.lon_max(), 12.0);
        assert_eq!(bb.lat_min(), 40.0);
        assert_eq!(bb.lat_max(), 51.0);

        bb.include_box(&BoundingBox::empty());
        assert_eq!(bb.lon_min(), -1.0);

        bb.reset();
        assert!(bb.is_empty());
    }

    #[test]
    fn viewport_projects_with_flipped_latitude() {
        let vp = Viewport::world(0.01);
        assert_eq!(vp.width(), 36_000);
        assert_eq!(vp.height(), 18_000);
        assert!((vp.proj_lon(-180.0)).abs() < 1e-9);
        assert!((vp.proj_lon(0.0) - 18_000.0).abs() < 1e-6);
        assert!((vp.proj_lat(90.0)).abs() < 1e-9);
        assert!((vp.proj_lat(-90.0) - 18_000.0).abs() < 1e-6);
        assert!(vp.proj_lat(10.0) < vp.proj_lat(-10.0));

        assert_eq!(vp.pixel_of(0.005, 0.005), Some((18_000, 8_999)));
        assert_eq!(vp.pixel_of(180.0, 0.0), None);
        assert_eq!(vp.pixel_of(0.0, -90.5), None);
        assert_eq!(vp.pixel_of(f64::NAN, 0.0), None);
    }

    #[test]
    fn viewport_from_extent_matches_resolution() {
        let vp = Viewport::from_extent(360.0, 180.0, 180.0, 90.0, 360, 180);
        assert!((vp.x_cover() - 1.0).abs() < 1e-12);
        assert!((vp.y_cover() - 1.0).abs() < 1e-12);
        assert_eq!(vp.pixel_of(11.6, 48.1), Some((191, 41)));
    }

    #[test]
    fn window_is_outward_inclusive_and_clamped() {
        let vp = Viewport::new(10.0, 10.0, 0.0, 10.0, 1.0);
        let window = vp.window_for(&BoundingBox::new(2.5, 4.5, 3.5, 6.5));
        assert_eq!(window, PixelWindow::new(1, 6, 2, 8));

        let edge = vp.window_for(&BoundingBox::new(-5.0, 20.0, -5.0, 20.0));
        assert_eq!(edge, PixelWindow::new(0, 10, 0, 10));
    }

    #[test]
    fn window_tiles_cover_every_pixel_once() {
        let window = PixelWindow::new(3, 600, 10, 270);
        let tiles = window.tiles(256);
        let covered: usize = tiles.iter().map(|t| t.width() * t.height()).sum();
        assert_eq!(covered, window.width() * window.height());
        assert!(tiles.iter().all(|t| t.width() <= 256 && t.height() <= 256));
    }

    #[test]
    fn catalog_merges_repeat_keys_and_filters_input() {
        let mut catalog = EntityCatalog::new(2, 10, 0.02);

        let first = Record::new(4, "Bavaria", square(9.0, 47.0, 3.0));
        assert_eq!(catalog.ingest(first), IngestOutcome::Created);
        let second = Record::new(4, "Bavaria", square(13.0, 49.0, 1.0));
        assert_eq!(catalog.ingest(second), IngestOutcome::Merged);

        let out_of_range = Record::new(11, "Street", square(0.0, 0.0, 1.0));
        assert_eq!(catalog.ingest(out_of_range), IngestOutcome::LevelOutOfRange);
        let empty = Record::new(4, "Nothing", Vec::new());
        assert_eq!(catalog.ingest(empty), IngestOutcome::Empty);
        let tiny = Record::new(4, "Speck", square(0.0, 0.0, 0.1));
        assert_eq!(catalog.ingest(tiny), IngestOutcome::BelowMinimumSize);

        let level = catalog.level(4).expect("level 4 exists");
        assert_eq!(level.len(), 1);
        let bavaria = level.get("Bavaria").expect("Bavaria kept");
        assert_eq!(bavaria.polygons().len(), 2);
        assert_eq!(bavaria.bounds().lon_max(), 14.0);
        assert_eq!(bavaria.bounds().lat_max(), 50.0);

        let stats = catalog.stats();
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.rings, 2);
        assert_eq!(stats.dropped_level, 1);
        assert_eq!(stats.dropped_empty, 1);
        assert_eq!(stats.dropped_small, 1);

        assert!(catalog.take_level(4).is_some());
        assert!(catalog.take_level(4).is_none());
    }

    #[test]
    fn size_order_is_largest_first() {
        let mut catalog = EntityCatalog::new(2, 10, 0.0);
        catalog.ingest(Record::new(8, "Small", square(0.0, 0.0, 1.0)));
        catalog.ingest(Record::new(8, "Large", square(0.0, 0.0, 5.0)));
        catalog.ingest(Record::new(8, "Medium", square(0.0, 0.0, 2.0)));
        catalog.ingest(Record::new(8, "Also medium", square(3.0, 3.0, 2.0)));

        let order: Vec<String> = catalog
            .take_level(8)
            .expect("level present")
            .into_size_order()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(order, ["Large", "Also medium", "Medium", "Small"]);
    }

    #[test]
    fn record_strips_segment_sentinel() {
        let record = Record::new(4, "Bad\0Label", square(0.0, 0.0, 1.0));
        assert_eq!(record.label, "BadLabel");
    }

    #[test]
    fn label_chain_wire_form_is_sentinel_terminated() {
        let mut city = LabelChain::new("Munich");
        city.append_parent(&LabelChain::new("Bavaria"));
        assert_eq!(city.to_wire_bytes(), b"Munich\0Bavaria\0");
        assert!(LabelChain::empty().to_wire_bytes().is_empty());

        let decoded = LabelChain::from_wire("Munich\0Bavaria\0");
        assert_eq!(decoded, city);
        assert!(LabelChain::from_wire("").is_empty());
    }

    #[test]
    fn empty_segments_survive_the_wire_form() {
        let blank = LabelChain::new("");
        assert_eq!(blank.to_wire_bytes(), b"\0");
        assert_eq!(LabelChain::from_wire("\0"), blank);

        let chain: LabelChain = ["Town", "", "Country"].into_iter().collect();
        let wire = String::from_utf8(chain.to_wire_bytes()).expect("utf8");
        assert_eq!(LabelChain::from_wire(&wire), chain);
    }

    #[test]
    fn viewport_extent_snaps_to_whole_pixels() {
        // 10 度不是 0.3 的整数倍：33 个像素，实际范围 9.9 度。
        let built = Viewport::new(10.0, 10.0, 0.0, 10.0, 0.3);
        assert_eq!(built.width(), 33);
        assert!((built.x_range() - 9.9).abs() < 1e-9);

        let loaded = Viewport::from_extent(
            built.x_range() as f32 as f64,
            built.y_range() as f32 as f64,
            built.x_shift() as f32 as f64,
            built.y_shift() as f32 as f64,
            built.width(),
            built.height(),
        );
        for lon in [0.05, 4.95, 9.05, 9.45, 9.85] {
            assert_eq!(built.pixel_of(lon, 5.0), loaded.pixel_of(lon, 5.0), "lon {lon}");
        }
    }

    #[test]
    fn winner_grid_rows_are_row_major() {
        let mut grid = WinnerGrid::new(3, 2);
        grid.set(2, 1, 7);
        assert_eq!(grid.row(1), &[0, 0, 7]);
        assert_eq!(grid.rows().count(), 2);
        grid.clear();
        assert!(grid.cells().iter().all(|&v| v == 0));
        assert!(WinnerGrid::from_cells(2, 2, vec![0; 3]).is_none());
    }
}
