use std::path::PathBuf;

use revgeo_config::ConfigError;
use revgeo_engine::errors::EngineError;
use revgeo_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("可视化未启用，请使用 `--features visualize` 编译")]
    VisualizeFeatureDisabled,
    #[error("写出可视化图像 {path:?} 失败: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
