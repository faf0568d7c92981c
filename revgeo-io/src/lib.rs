use std::path::{Path, PathBuf};

use revgeo_core::catalog::EntityCatalog;
use thiserror::Error;

pub mod geocoder;
pub mod index;
pub mod records;

pub use geocoder::{ReverseGeocoder, RowRuns};
pub use index::{IndexSummary, encode_index, write_index};
pub use records::{ReadStats, TsvRecordLoader, parse_line};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a reverse geocoding index (magic 0x{found:08x})")]
    BadMagic { found: u32 },
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error("{count} indexed values exceed the format limit of 65535")]
    CapacityExceeded { count: usize },
    #[error("row {row} encodes to {bytes} bytes, more than the 65535 the row table can hold")]
    RowTooLong { row: usize, bytes: usize },
    #[error("label chain of entity {entity} is {bytes} bytes, limit is 32767")]
    LabelChainTooLong { entity: u32, bytes: usize },
    #[error("grid {width}x{height} exceeds the 65535 pixel limit per axis")]
    DimensionTooLarge { width: usize, height: usize },
    #[error("invalid raster: {0}")]
    InvalidRaster(String),
}

/// 将输入记录装入实体目录。
pub trait CatalogLoader {
    fn load_into(&self, path: &Path, catalog: &mut EntityCatalog) -> Result<ReadStats, IoError>;
}
