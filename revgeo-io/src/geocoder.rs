use std::fs;
use std::path::Path;

use revgeo_core::format::RUN_BYTES;
use revgeo_core::geometry::Viewport;
use revgeo_core::raster::LabelChain;
use tracing::{debug, info};

use crate::IoError;
use crate::index::decode_index;

/// 一行解码后的游程表：每个游程的累计结束位置与稠密编号。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowRuns {
    ends: Vec<usize>,
    indices: Vec<u16>,
}

impl RowRuns {
    fn decode(row: &[u8]) -> Self {
        let runs = row.len() / RUN_BYTES;
        let mut ends = Vec::with_capacity(runs);
        let mut indices = Vec::with_capacity(runs);
        let mut cursor = 0usize;
        for run in row.chunks_exact(RUN_BYTES) {
            cursor += run[2] as usize + 1;
            ends.push(cursor);
            indices.push(u16::from_be_bytes([run[0], run[1]]));
        }
        Self { ends, indices }
    }

    /// 该行覆盖的像素数。
    pub fn width(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    pub fn run_count(&self) -> usize {
        self.ends.len()
    }

    /// 查找 `x` 所在游程的稠密编号；越界返回 0。
    pub fn resolve(&self, x: usize) -> u16 {
        let run = self.ends.partition_point(|&end| end <= x);
        self.indices.get(run).copied().unwrap_or(0)
    }
}

/// 只读的逆地理编码查询器。加载时完整校验，之后可在任意多个线程间共享查询。
#[derive(Debug, Clone)]
pub struct ReverseGeocoder {
    viewport: Viewport,
    row_offsets: Vec<usize>,
    rows: Vec<u8>,
    labels: Vec<LabelChain>,
}

impl ReverseGeocoder {
    /// 从文件加载索引。
    pub fn open(path: &Path) -> Result<Self, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let geocoder = Self::from_bytes(&bytes)?;
        info!(
            path = %path.display(),
            width = geocoder.width(),
            height = geocoder.height(),
            entities = geocoder.len(),
            "索引已加载"
        );
        Ok(geocoder)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IoError> {
        let decoded = decode_index(bytes)?;
        Ok(Self {
            viewport: decoded.viewport,
            row_offsets: decoded.row_offsets,
            rows: decoded.rows,
            labels: decoded.labels,
        })
    }

    /// 稠密编号数量 `c`，含表示“无归属”的 0 号。
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// 除 0 号外没有任何实体。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.len() <= 1
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.viewport.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.viewport.height()
    }

    #[inline]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// 稠密编号对应的标签链。
    pub fn label_chain(&self, dense: u16) -> Option<&LabelChain> {
        self.labels.get(dense as usize)
    }

    /// 解码第 `y` 行；行号越界返回 `None`。
    pub fn decode_row(&self, y: usize) -> Option<RowRuns> {
        let start = *self.row_offsets.get(y)?;
        let end = *self.row_offsets.get(y + 1)?;
        Some(RowRuns::decode(&self.rows[start..end]))
    }

    /// 按行顺序扫描游程，只解码到 `x` 所在的游程为止。
    fn index_at(&self, x: usize, y: usize) -> u16 {
        let row = &self.rows[self.row_offsets[y]..self.row_offsets[y + 1]];
        let mut cursor = 0usize;
        for run in row.chunks_exact(RUN_BYTES) {
            cursor += run[2] as usize + 1;
            if x < cursor {
                return u16::from_be_bytes([run[0], run[1]]);
            }
        }
        0
    }

    /// 坐标所在区域的标签链；网格外或无归属时返回 `None`。
    pub fn lookup_chain(&self, lon: f32, lat: f32) -> Option<&LabelChain> {
        let (x, y) = self.viewport.pixel_of(lon as f64, lat as f64)?;
        match self.index_at(x, y) {
            0 => None,
            dense => self.label_chain(dense),
        }
    }

    /// 从最细到最粗返回包含该坐标的区域标签。
    pub fn lookup(&self, lon: f32, lat: f32) -> Vec<String> {
        self.lookup_chain(lon, lat)
            .map(|chain| chain.segments().to_vec())
            .unwrap_or_default()
    }

    /// 批量查询。同一行的点共享一次行解码，结果顺序与输入一致。
    pub fn lookup_many(&self, points: &[(f32, f32)]) -> Vec<Vec<String>> {
        let mut results = vec![Vec::new(); points.len()];
        let mut pending: Vec<(usize, usize, usize)> = points
            .iter()
            .enumerate()
            .filter_map(|(i, &(lon, lat))| {
                let (x, y) = self.viewport.pixel_of(lon as f64, lat as f64)?;
                Some((y, x, i))
            })
            .collect();
        pending.sort_unstable();

        let mut decoded_rows = 0usize;
        let mut current: Option<(usize, RowRuns)> = None;
        for (y, x, i) in pending {
            if current.as_ref().map(|(row, _)| *row) != Some(y) {
                decoded_rows += 1;
                current = Some((y, self.decode_row(y).unwrap_or_default()));
            }
            let Some((_, runs)) = &current else {
                continue;
            };
            let dense = runs.resolve(x);
            if let Some(chain) = self.label_chain(dense).filter(|_| dense != 0) {
                results[i] = chain.segments().to_vec();
            }
        }
        debug!(points = points.len(), rows = decoded_rows, "批量查询完成");
        results
    }

    /// 释放查询器持有的全部数据。
    pub fn close(self) {
        debug!(entities = self.len(), "查询器已关闭");
    }
}
