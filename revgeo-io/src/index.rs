//! 分层逆地理编码索引的二进制格式（大端序）：
//!
//! ```text
//!   00  : u32     magic = 0x6E06E000
//!   04  : u16     width
//!   06  : u16     height
//!   08  : f32     x extent (deg)
//!   0C  : f32     y extent (deg)
//!   10  : f32     x shift
//!   14  : f32     y shift
//!   18  : u16     c, number of dense indexes (slot 0 = no region)
//!   1A  : u16[height]  encoded byte length of each row
//!   ..  : rows, each a sequence of runs [u16 dense index][u8 run length - 1]
//!   ..  : u16[c]  byte length of each label chain
//!   ..  : label chains, UTF-8, every segment terminated by NUL
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use revgeo_core::format::{
    HEADER_BYTES, INDEX_MAGIC, MAX_DIMENSION, MAX_ENTITIES, MAX_LABEL_CHAIN_BYTES, MAX_ROW_BYTES,
    MAX_RUN, RUN_BYTES,
};
use revgeo_core::geometry::Viewport;
use revgeo_core::raster::{LabelChain, LayeredRaster, WinnerGrid};
use tracing::{debug, info};

use crate::IoError;

const ABSENT: u32 = u32::MAX;

/// 写出结果摘要。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSummary {
    pub width: usize,
    pub height: usize,
    pub entity_count: usize,
    pub bytes: usize,
}

/// 把最终栅格与标签链编码为完整的索引字节串。相同输入总是得到相同输出。
pub fn encode_index(raster: &LayeredRaster) -> Result<Vec<u8>, IoError> {
    encode(&raster.grid, &raster.labels, &raster.viewport)
}

fn encode(grid: &WinnerGrid, labels: &[LabelChain], viewport: &Viewport) -> Result<Vec<u8>, IoError> {
    let (width, height) = (grid.width(), grid.height());
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(IoError::DimensionTooLarge { width, height });
    }
    if width != viewport.width() || height != viewport.height() {
        return Err(IoError::InvalidRaster(format!(
            "grid {width}x{height} does not match viewport {}x{}",
            viewport.width(),
            viewport.height()
        )));
    }

    // 稠密编号：0 总是占据槽位 0，其余按原始编号升序。
    let mut dense = vec![ABSENT; labels.len().max(1)];
    dense[0] = 0;
    for &value in grid.cells() {
        let slot = dense.get_mut(value as usize).ok_or_else(|| {
            IoError::InvalidRaster(format!("entity {value} has no label chain"))
        })?;
        *slot = 0;
    }
    let mut count = 0usize;
    for slot in dense.iter_mut() {
        if *slot != ABSENT {
            *slot = count as u32;
            count += 1;
        }
    }
    info!(entities = count, "已使用的实体数");
    if count > MAX_ENTITIES {
        return Err(IoError::CapacityExceeded { count });
    }

    let mut row_lengths = Vec::with_capacity(height);
    let mut row_data = Vec::new();
    for (y, row) in grid.rows().enumerate() {
        let before = row_data.len();
        encode_row(row, &dense, &mut row_data);
        let bytes = row_data.len() - before;
        if bytes > MAX_ROW_BYTES {
            return Err(IoError::RowTooLong { row: y, bytes });
        }
        row_lengths.push(bytes as u16);
    }

    let mut metadata = Vec::with_capacity(count);
    for (entity, _) in dense.iter().enumerate().filter(|(_, slot)| **slot != ABSENT) {
        let bytes = labels
            .get(entity)
            .map(LabelChain::to_wire_bytes)
            .unwrap_or_default();
        if bytes.len() >= MAX_LABEL_CHAIN_BYTES {
            return Err(IoError::LabelChainTooLong {
                entity: entity as u32,
                bytes: bytes.len(),
            });
        }
        metadata.push(bytes);
    }

    let metadata_bytes: usize = metadata.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(
        HEADER_BYTES + 2 * height + row_data.len() + 2 * count + metadata_bytes,
    );
    put_u32(&mut out, INDEX_MAGIC);
    put_u16(&mut out, width as u16);
    put_u16(&mut out, height as u16);
    put_f32(&mut out, viewport.x_range() as f32);
    put_f32(&mut out, viewport.y_range() as f32);
    put_f32(&mut out, viewport.x_shift() as f32);
    put_f32(&mut out, viewport.y_shift() as f32);
    put_u16(&mut out, count as u16);
    debug!(offset = out.len(), "行表起始位置");
    for length in &row_lengths {
        put_u16(&mut out, *length);
    }
    out.extend_from_slice(&row_data);
    debug!(offset = out.len(), "元数据起始位置");
    for chain in &metadata {
        put_u16(&mut out, chain.len() as u16);
    }
    for chain in &metadata {
        out.extend_from_slice(chain);
    }
    Ok(out)
}

/// 行内游程编码：相同值的最长水平段，每段最多 256 像素。
fn encode_row(row: &[u32], dense: &[u32], out: &mut Vec<u8>) {
    let mut x = 0;
    while x < row.len() {
        let value = row[x];
        let mut run = 1;
        while run < MAX_RUN && x + run < row.len() && row[x + run] == value {
            run += 1;
        }
        let index = dense[value as usize] as u16;
        out.extend_from_slice(&index.to_be_bytes());
        out.push((run - 1) as u8);
        x += run;
    }
}

/// 编码并写出索引。先完整编码，再写入同目录临时文件后改名，失败时不会留下半成品。
pub fn write_index(raster: &LayeredRaster, path: &Path) -> Result<IndexSummary, IoError> {
    let start = Instant::now();
    let bytes = encode_index(raster)?;
    let partial = partial_path(path);
    let write_error = |source| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    };
    if let Err(source) = fs::write(&partial, &bytes) {
        let _ = fs::remove_file(&partial);
        return Err(write_error(source));
    }
    if let Err(source) = fs::rename(&partial, path) {
        let _ = fs::remove_file(&partial);
        return Err(write_error(source));
    }
    let summary = IndexSummary {
        width: raster.grid.width(),
        height: raster.grid.height(),
        entity_count: read_entity_count(&bytes),
        bytes: bytes.len(),
    };
    info!(
        path = %path.display(),
        bytes = summary.bytes,
        entities = summary.entity_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "索引已写出"
    );
    Ok(summary)
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn read_entity_count(bytes: &[u8]) -> usize {
    bytes
        .get(24..26)
        .map(|raw| u16::from_be_bytes([raw[0], raw[1]]) as usize)
        .unwrap_or(0)
}

/// 解码后的索引：行数据保持游程编码，只有行偏移与标签链被展开。
#[derive(Debug, Clone)]
pub struct DecodedIndex {
    pub viewport: Viewport,
    pub row_offsets: Vec<usize>,
    pub rows: Vec<u8>,
    pub labels: Vec<LabelChain>,
}

/// 校验并解码完整的索引字节串。
pub fn decode_index(bytes: &[u8]) -> Result<DecodedIndex, IoError> {
    let mut cursor = bytes;
    let magic = read_u32(&mut cursor).map_err(|_| truncated("magic"))?;
    if magic != INDEX_MAGIC {
        return Err(IoError::BadMagic { found: magic });
    }
    let header = (|| -> io::Result<_> {
        Ok((
            read_u16(&mut cursor)? as usize,
            read_u16(&mut cursor)? as usize,
            read_f32(&mut cursor)?,
            read_f32(&mut cursor)?,
            read_f32(&mut cursor)?,
            read_f32(&mut cursor)?,
            read_u16(&mut cursor)? as usize,
        ))
    })();
    let (width, height, x_range, y_range, x_shift, y_shift, count) =
        header.map_err(|_| truncated("header"))?;
    if count == 0 {
        return Err(IoError::Corrupt("entity count is zero".to_string()));
    }

    let mut row_offsets = Vec::with_capacity(height + 1);
    let mut total = 0usize;
    row_offsets.push(0);
    for _ in 0..height {
        total += read_u16(&mut cursor).map_err(|_| truncated("row table"))? as usize;
        row_offsets.push(total);
    }
    let rows = take(&mut cursor, total).ok_or_else(|| truncated("row data"))?;
    for y in 0..height {
        validate_row(&rows[row_offsets[y]..row_offsets[y + 1]], y, width, count)?;
    }

    let mut label_lengths = Vec::with_capacity(count);
    for _ in 0..count {
        label_lengths.push(read_u16(&mut cursor).map_err(|_| truncated("label table"))? as usize);
    }
    let mut labels = Vec::with_capacity(count);
    for (dense, length) in label_lengths.into_iter().enumerate() {
        let raw = take(&mut cursor, length).ok_or_else(|| truncated("label data"))?;
        let text = std::str::from_utf8(raw)
            .map_err(|_| IoError::Corrupt(format!("label chain {dense} is not UTF-8")))?;
        labels.push(LabelChain::from_wire(text));
    }
    if !cursor.is_empty() {
        return Err(IoError::Corrupt(format!(
            "{} trailing bytes after label data",
            cursor.len()
        )));
    }

    Ok(DecodedIndex {
        viewport: Viewport::from_extent(
            x_range as f64,
            y_range as f64,
            x_shift as f64,
            y_shift as f64,
            width,
            height,
        ),
        row_offsets,
        rows: rows.to_vec(),
        labels,
    })
}

/// 每行必须由完整游程组成，总长恰为 `width`，且索引都在 `[0, c)` 内。
fn validate_row(row: &[u8], y: usize, width: usize, count: usize) -> Result<(), IoError> {
    if row.len() % RUN_BYTES != 0 {
        return Err(IoError::Corrupt(format!("row {y} has a partial run")));
    }
    let mut covered = 0usize;
    for run in row.chunks_exact(RUN_BYTES) {
        let index = u16::from_be_bytes([run[0], run[1]]) as usize;
        if index >= count {
            return Err(IoError::Corrupt(format!(
                "row {y} references index {index} of {count}"
            )));
        }
        covered += run[2] as usize + 1;
    }
    if covered != width {
        return Err(IoError::Corrupt(format!(
            "row {y} covers {covered} pixels, expected {width}"
        )));
    }
    Ok(())
}

fn truncated(section: &str) -> IoError {
    IoError::Corrupt(format!("file truncated in {section}"))
}

#[inline]
fn take<'a>(cursor: &mut &'a [u8], len: usize) -> Option<&'a [u8]> {
    if cursor.len() < len {
        return None;
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Some(head)
}

#[inline]
fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

#[inline]
fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

#[inline]
fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_be_bytes(b))
}

#[inline]
fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[inline]
fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

#[inline]
fn put_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_be_bytes());
}
