pub mod errors;
pub mod pipeline;
pub mod query;

#[cfg(feature = "visualize")]
pub mod visualize;

use std::path::Path;

use errors::FrontendError;
use pipeline::{BuildOptions, BuildReport};
use query::QueryAnswer;
use revgeo_config::AppConfig;
use tracing::info;

/// 执行一次完整的索引构建。
pub fn run_build(config: &AppConfig, options: &BuildOptions) -> Result<BuildReport, FrontendError> {
    info!(input = %options.input.display(), output = %options.output.display(), "开始构建索引");
    pipeline::build_index(config, options)
}

/// 打开索引并查询一组坐标；返回结果与索引中的实体数。
pub fn run_query(
    index: &Path,
    points: &[(f32, f32)],
) -> Result<(Vec<QueryAnswer>, usize), FrontendError> {
    let geocoder = query::open_index(index)?;
    let answers = query::query_points(&geocoder, points);
    let entities = geocoder.len();
    geocoder.close();
    Ok((answers, entities))
}
