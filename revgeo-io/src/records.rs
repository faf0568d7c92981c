//! 制表符分隔的输入记录：若干标签列，随后第一个纯数字列为层级，其后每个 `lon,lat` 列是一个顶点。
//! 每行描述一个多边形环，同名实体的多行会在目录中合并。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use flate2::read::GzDecoder;
use glam::Vec2;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use revgeo_core::catalog::{EntityCatalog, IngestOutcome, Record};
use thiserror::Error;
use tracing::{info, warn};

use crate::{CatalogLoader, IoError};

static LEVEL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\t(\d+)\t").expect("level pattern is valid"));

static COORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?\d+(?:\.\d*)?),(-?\d+(?:\.\d*)?)$").expect("coordinate pattern is valid")
});

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const DEFAULT_BATCH_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("no level column")]
    MissingLevel,
    #[error("level {0:?} is out of range")]
    InvalidLevel(String),
    #[error("empty label")]
    EmptyLabel,
    #[error("no coordinates")]
    NoVertices,
}

/// 解析一行输入。
pub fn parse_line(line: &str) -> Result<Record, LineError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let captures = LEVEL_PATTERN
        .captures(line)
        .ok_or(LineError::MissingLevel)?;
    let (Some(whole), Some(digits)) = (captures.get(0), captures.get(1)) else {
        return Err(LineError::MissingLevel);
    };
    let level = digits
        .as_str()
        .parse::<u32>()
        .map_err(|_| LineError::InvalidLevel(digits.as_str().to_string()))?;
    let label = &line[..whole.start()];
    if label.trim().is_empty() {
        return Err(LineError::EmptyLabel);
    }

    let mut ring = Vec::new();
    for field in line[whole.end()..].split('\t') {
        let Some(coords) = COORD_PATTERN.captures(field) else {
            continue;
        };
        let (Ok(lon), Ok(lat)) = (coords[1].parse::<f32>(), coords[2].parse::<f32>()) else {
            continue;
        };
        ring.push(Vec2::new(lon, lat));
    }
    if ring.is_empty() {
        return Err(LineError::NoVertices);
    }
    Ok(Record::new(level, label, ring))
}

/// 读取统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub lines: usize,
    pub malformed: usize,
    pub created: usize,
    pub merged: usize,
    pub filtered: usize,
}

impl ReadStats {
    fn record(&mut self, outcome: IngestOutcome) {
        match outcome {
            IngestOutcome::Created => self.created += 1,
            IngestOutcome::Merged => self.merged += 1,
            IngestOutcome::LevelOutOfRange
            | IngestOutcome::Empty
            | IngestOutcome::BelowMinimumSize => self.filtered += 1,
        }
    }
}

/// 文本记录加载器，自动识别 gzip 压缩输入。
pub struct TsvRecordLoader {
    batch_size: usize,
}

impl TsvRecordLoader {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// 从任意缓冲读取器读取记录；按批并行解析，按输入顺序写入目录。
    pub fn read_from<R: BufRead>(
        &self,
        mut reader: R,
        catalog: &mut EntityCatalog,
    ) -> std::io::Result<ReadStats> {
        let mut stats = ReadStats::default();
        let mut batch: Vec<String> = Vec::with_capacity(self.batch_size);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = reader.read_until(b'\n', &mut buffer)?;
            if read > 0 {
                batch.push(String::from_utf8_lossy(&buffer).into_owned());
            }
            if batch.len() >= self.batch_size || (read == 0 && !batch.is_empty()) {
                self.ingest_batch(&batch, catalog, &mut stats);
                batch.clear();
            }
            if read == 0 {
                break;
            }
        }
        Ok(stats)
    }

    fn ingest_batch(&self, batch: &[String], catalog: &mut EntityCatalog, stats: &mut ReadStats) {
        let parsed: Vec<Result<Record, LineError>> =
            batch.par_iter().map(|line| parse_line(line)).collect();
        for (line, result) in batch.iter().zip(parsed) {
            stats.lines += 1;
            match result {
                Ok(record) => stats.record(catalog.ingest(record)),
                Err(err) => {
                    stats.malformed += 1;
                    warn!(line = stats.lines, error = %err, content = line.trim_end(), "跳过无法解析的输入行");
                }
            }
        }
    }
}

impl Default for TsvRecordLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogLoader for TsvRecordLoader {
    fn load_into(&self, path: &Path, catalog: &mut EntityCatalog) -> Result<ReadStats, IoError> {
        let read_error = |source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        };
        let start = Instant::now();
        let file = File::open(path).map_err(read_error)?;
        let mut reader = BufReader::new(file);
        let is_gzip = reader.fill_buf().map_err(read_error)?.starts_with(&GZIP_MAGIC);
        let stats = if is_gzip {
            self.read_from(BufReader::new(GzDecoder::new(reader)), catalog)
        } else {
            self.read_from(reader, catalog)
        }
        .map_err(read_error)?;
        info!(
            path = %path.display(),
            gzip = is_gzip,
            elapsed_ms = start.elapsed().as_millis() as u64,
            lines = stats.lines,
            malformed = stats.malformed,
            entities = stats.created,
            rings = stats.created + stats.merged,
            "输入解析完成"
        );
        Ok(stats)
    }
}
