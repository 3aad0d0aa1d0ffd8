use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use floorplan_config::{AppConfig, ConfigError};
use floorplan_engine::ingest::{IngestOptions, ingest};
use floorplan_io::{load_cad_document, load_footprints, write_json, write_text};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod summary;

use summary::{OutputFile, Summary};

/// 把 CAD 平面图导入为分层 SVG 场景与块包围盒表。
#[derive(Debug, Parser)]
#[command(name = "floorplan-ingest", version)]
struct Cli {
    /// 配置文件路径；缺省时读取 FLOORPLAN_CONFIG 或 ./config/default.toml。
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_configuration(cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("错误: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);
    info!("启动平面图导入");

    match run(&config) {
        Ok(summary) => {
            print!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "导入失败");
            eprintln!("错误: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AppConfig) -> Result<Summary> {
    let settings = &config.ingest;
    let document = load_cad_document(&settings.input)
        .with_context(|| format!("无法读取 CAD 文件 {}", settings.input.display()))?;
    let footprints = load_footprints(&settings.footprints)
        .with_context(|| format!("无法读取轮廓表 {}", settings.footprints.display()))?;
    let options = IngestOptions::from_config(settings).context("导入参数无效")?;

    let output = ingest(&document, &footprints, &options);

    let svg = output.scene.to_svg();
    write_text(&settings.scene_output, &svg).context("写出场景失败")?;
    write_json(&settings.bounds_output, &output.bounds).context("写出包围盒表失败")?;

    let outputs = [&settings.scene_output, &settings.bounds_output]
        .into_iter()
        .map(|path| OutputFile::inspect(path.as_path()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Summary::new(output.report, output.bounds.len(), outputs))
}

/// 显式指定的配置必须可用；自动发现失败时退回内建默认值。
fn load_configuration(override_path: Option<PathBuf>) -> Result<AppConfig> {
    match override_path {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("加载配置 {} 失败", path.display())),
        None => match AppConfig::discover() {
            Ok(cfg) => Ok(cfg),
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                Ok(AppConfig::default())
            }
        },
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
