use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use revgeo_config::{AppConfig, ConfigError};
use revgeo_frontend::pipeline::BuildOptions;
use serde_json::json;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "revgeo", version, about = "栅格化的分层逆地理编码索引")]
struct Cli {
    /// 配置文件路径，缺省时依次尝试 `REVGEO_CONFIG` 与 `./config/default.toml`。
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 从制表符分隔的多边形记录构建索引。
    Build {
        input: PathBuf,
        output: PathBuf,
        /// 同时输出归属栅格的 PNG 预览。
        #[arg(long)]
        image: Option<PathBuf>,
    },
    /// 查询一个或多个 `经度 纬度` 坐标。
    Query {
        index: PathBuf,
        #[arg(required = true, num_args = 2.., allow_negative_numbers = true)]
        coords: Vec<f32>,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let (config, discovery_error) = match load_configuration(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };
    init_logging(&config);
    if let Some(err) = discovery_error {
        report_discovery_failure(&err);
    }
    info!("启动 revgeo");

    if let Err(err) = run(cli.command, &config) {
        error!(error = %format!("{err:#}"), "执行失败");
        std::process::exit(1);
    }
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Build {
            input,
            output,
            image,
        } => {
            let options = BuildOptions {
                input,
                output,
                image,
            };
            let report = revgeo_frontend::run_build(config, &options)
                .with_context(|| format!("构建索引 {} 失败", options.output.display()))?;
            println!(
                "wrote {} ({} bytes, {} entities, {}x{})",
                options.output.display(),
                report.summary.bytes,
                report.summary.entity_count,
                report.summary.width,
                report.summary.height
            );
        }
        Command::Query {
            index,
            coords,
            json,
        } => {
            if coords.len() % 2 != 0 {
                bail!("坐标必须成对给出（经度 纬度），收到 {} 个数值", coords.len());
            }
            let points: Vec<(f32, f32)> = coords.chunks_exact(2).map(|p| (p[0], p[1])).collect();
            let (answers, entities) = revgeo_frontend::run_query(&index, &points)
                .with_context(|| format!("查询索引 {} 失败", index.display()))?;
            if json {
                let value: Vec<_> = answers
                    .iter()
                    .map(|answer| {
                        json!({
                            "lon": answer.lon,
                            "lat": answer.lat,
                            "labels": answer.labels,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string(&value)?);
            } else {
                for answer in &answers {
                    println!("{answer}");
                }
                println!("Number of entities: {entities}");
            }
        }
    }
    Ok(())
}

/// 显式指定的配置加载失败是致命错误；自动发现失败时回退到默认配置，并把错误留到日志初始化后报告。
fn load_configuration(override_path: Option<&Path>) -> Result<(AppConfig, Option<ConfigError>)> {
    match override_path {
        Some(path) => {
            let config = AppConfig::from_file(path)
                .with_context(|| format!("加载配置文件 {} 失败", path.display()))?;
            Ok((config, None))
        }
        None => match AppConfig::discover() {
            Ok(cfg) => Ok((cfg, None)),
            Err(err) => Ok((AppConfig::default(), Some(err))),
        },
    }
}

fn report_discovery_failure(err: &ConfigError) {
    match err {
        ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
            warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
        }
        ConfigError::Context { .. } | ConfigError::Invalid(_) => {
            warn!(error = %err, "加载默认配置失败，使用内建默认值");
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
