use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const CONFIG_ENV: &str = "REVGEO_CONFIG";
/// 网格每个维度允许的最大像素数，受索引文件 u16 宽高字段限制。
const MAX_GRID_DIMENSION: f64 = 65_535.0;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub levels: LevelConfig,
    #[serde(default)]
    pub raster: RasterConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// 自动发现配置文件：优先读取环境变量 `REVGEO_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 在开始构建前拒绝无意义的参数。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;
        if !(grid.resolution.is_finite() && grid.resolution > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "grid.resolution 必须为正数（当前 {}）",
                grid.resolution
            )));
        }
        if !(grid.x_range > 0.0 && grid.y_range > 0.0) {
            return Err(ConfigError::Invalid(
                "grid.x_range 与 grid.y_range 必须为正数".to_string(),
            ));
        }
        let width = (grid.x_range / grid.resolution).round();
        let height = (grid.y_range / grid.resolution).round();
        if width > MAX_GRID_DIMENSION || height > MAX_GRID_DIMENSION {
            return Err(ConfigError::Invalid(format!(
                "网格 {width}x{height} 超出索引格式允许的 65535 像素"
            )));
        }
        if self.levels.min > self.levels.max {
            return Err(ConfigError::Invalid(format!(
                "levels.min ({}) 大于 levels.max ({})",
                self.levels.min, self.levels.max
            )));
        }
        if self.raster.tile_size == 0 || self.raster.samples == 0 {
            return Err(ConfigError::Invalid(
                "raster.tile_size 与 raster.samples 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 世界网格（等距圆柱投影）参数，单位为度。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GridConfig {
    #[serde(default = "GridConfig::default_x_range")]
    pub x_range: f64,
    #[serde(default = "GridConfig::default_y_range")]
    pub y_range: f64,
    #[serde(default = "GridConfig::default_x_shift")]
    pub x_shift: f64,
    #[serde(default = "GridConfig::default_y_shift")]
    pub y_shift: f64,
    #[serde(default = "GridConfig::default_resolution")]
    pub resolution: f64,
}

impl GridConfig {
    fn default_x_range() -> f64 {
        360.0
    }

    fn default_y_range() -> f64 {
        180.0
    }

    fn default_x_shift() -> f64 {
        180.0
    }

    fn default_y_shift() -> f64 {
        90.0
    }

    fn default_resolution() -> f64 {
        0.01
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            x_range: Self::default_x_range(),
            y_range: Self::default_y_range(),
            x_shift: Self::default_x_shift(),
            y_shift: Self::default_y_shift(),
            resolution: Self::default_resolution(),
        }
    }
}

/// 参与构建的层级范围（闭区间）。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LevelConfig {
    #[serde(default = "LevelConfig::default_min")]
    pub min: u32,
    #[serde(default = "LevelConfig::default_max")]
    pub max: u32,
}

impl LevelConfig {
    fn default_min() -> u32 {
        2
    }

    fn default_max() -> u32 {
        10
    }
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            min: Self::default_min(),
            max: Self::default_max(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RasterConfig {
    /// 包围盒面积阈值 = `min_pixel_size * resolution`。
    #[serde(default = "RasterConfig::default_min_pixel_size")]
    pub min_pixel_size: f64,
    #[serde(default = "RasterConfig::default_tile_size")]
    pub tile_size: usize,
    #[serde(default = "RasterConfig::default_samples")]
    pub samples: usize,
}

impl RasterConfig {
    fn default_min_pixel_size() -> f64 {
        2.0
    }

    fn default_tile_size() -> usize {
        256
    }

    fn default_samples() -> usize {
        16
    }

    /// 环被保留所需的最小包围盒面积。
    pub fn min_size(&self, resolution: f64) -> f64 {
        self.min_pixel_size * resolution
    }
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            min_pixel_size: Self::default_min_pixel_size(),
            tile_size: Self::default_tile_size(),
            samples: Self::default_samples(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("配置无效: {0}")]
    Invalid(String),
}
