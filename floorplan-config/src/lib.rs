use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `FLOORPLAN_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("FLOORPLAN_CONFIG") {
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

/// 离线导入流程的输入输出路径与几何参数。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub input: PathBuf,
    pub footprints: PathBuf,
    pub scene_output: PathBuf,
    pub bounds_output: PathBuf,
    /// 唯一渲染块参照的图层。
    pub equipment_layer: String,
    pub percentile_low: f64,
    pub percentile_high: f64,
    pub transform: TransformConfig,
    pub keep_region: RegionConfig,
    pub layers: Vec<LayerRule>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/floorplan.dxf"),
            footprints: PathBuf::from("data/footprints.json"),
            scene_output: PathBuf::from("out/floorplan.svg"),
            bounds_output: PathBuf::from("out/block_bounds.json"),
            equipment_layer: "E-EQUIP".to_string(),
            percentile_low: 0.02,
            percentile_high: 0.98,
            transform: TransformConfig::default(),
            keep_region: RegionConfig::default(),
            layers: LayerRule::defaults(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub x_offset: f64,
    pub y_flip_origin: f64,
    pub scale: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            x_offset: 1_200.0,
            y_flip_origin: 9_600.0,
            scale: 0.1,
        }
    }
}

/// 图纸空间的保留区域，区域外的几何在导入时被丢弃。
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            min_x: 1_200.0,
            min_y: 1_800.0,
            max_x: 13_200.0,
            max_y: 9_600.0,
        }
    }
}

/// 允许导入的图层及其输出样式。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayerRule {
    pub layer: String,
    pub group: String,
    #[serde(default = "LayerRule::default_stroke")]
    pub stroke: String,
    #[serde(default = "LayerRule::default_stroke_width")]
    pub stroke_width: f64,
    #[serde(default)]
    pub dash: Option<String>,
    #[serde(default)]
    pub fill: Option<String>,
    #[serde(default = "LayerRule::default_opacity")]
    pub opacity: f64,
}

impl LayerRule {
    fn default_stroke() -> String {
        "#1f2937".to_string()
    }

    fn default_stroke_width() -> f64 {
        1.0
    }

    fn default_opacity() -> f64 {
        1.0
    }

    fn new(layer: &str, group: &str, stroke: &str, stroke_width: f64) -> Self {
        Self {
            layer: layer.to_string(),
            group: group.to_string(),
            stroke: stroke.to_string(),
            stroke_width,
            dash: None,
            fill: None,
            opacity: 1.0,
        }
    }

    /// 参考厂房图纸使用的图层表，输出顺序即绘制顺序。
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                fill: Some("#e2e8f0".to_string()),
                opacity: 0.6,
                ..Self::new("A-AREA", "areas", "#94a3b8", 0.5)
            },
            Self::new("A-WALL", "walls", "#1f2937", 1.5),
            Self {
                fill: Some("#9ca3af".to_string()),
                ..Self::new("A-COLS", "columns", "#374151", 0.75)
            },
            Self {
                dash: Some("3 2".to_string()),
                ..Self::new("A-DOOR", "doors", "#6b7280", 0.5)
            },
            Self::new("A-GLAZ", "glazing", "#38bdf8", 0.75),
            Self {
                fill: Some("#99f6e4".to_string()),
                opacity: 0.85,
                ..Self::new("E-EQUIP", "equipment", "#0f766e", 0.75)
            },
        ]
    }
}

/// 交互编辑器参数，单位均为图纸单位。
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub grid_size: f64,
    pub snap_enabled: bool,
    pub closing_radius: f64,
    pub label_font_size: f64,
    pub hit_tolerance: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            grid_size: 10.0,
            snap_enabled: true,
            closing_radius: 12.0,
            label_font_size: 14.0,
            hit_tolerance: 6.0,
        }
    }
}

/// 视口限制，`min_scale`/`max_scale` 为视口宽度相对画布宽度的比例。
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub wheel_factor: f64,
    pub screen_width: f64,
    pub screen_height: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.05,
            max_scale: 2.0,
            wheel_factor: 1.1,
            screen_width: 1_200.0,
            screen_height: 780.0,
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
}
