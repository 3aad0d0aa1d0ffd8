use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};
use floorplan_core::{
    document::Document,
    equipment::{AssetRecord, FootprintRecord, FootprintTable},
    floor::BuilderFloor,
};

mod dxf;
mod json_cad;

use dxf::DxfParser;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
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
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
    #[error("invalid JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

/// DXF 文本格式读取器。
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, data: &str) -> Result<Document, IoError> {
        DxfParser::new(data)
            .parse()
            .map_err(|err| IoError::InvalidDocument(err.into_message()))
    }
}

impl Default for DxfFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = read_text(path)?;
        self.parse_str(&data)
    }
}

/// JSON 实体导出读取器。
pub struct JsonCadFacade;

impl JsonCadFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonCadFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader for JsonCadFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = read_text(path)?;
        json_cad::parse_json_cad(&data).map_err(|source| IoError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// 按扩展名选择读取器：`.dxf` 与 `.json`。
pub fn load_cad_document(path: &Path) -> Result<Document, IoError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let document = match extension.as_deref() {
        Some("dxf") => DxfFacade::new().load(path)?,
        Some("json") => JsonCadFacade::new().load(path)?,
        other => {
            return Err(IoError::UnsupportedFeature(format!(
                "无法识别的 CAD 文件类型 {:?}（{}）",
                other,
                path.display()
            )));
        }
    };
    info!(
        path = %path.display(),
        entities = document.entities().count(),
        blocks = document.blocks().count(),
        "CAD 文档加载完成"
    );
    Ok(document)
}

/// 读取轮廓元数据表（JSON 数组）。
pub fn load_footprints(path: &Path) -> Result<FootprintTable, IoError> {
    let records: Vec<FootprintRecord> = read_json(path)?;
    let total = records.len();
    let table: FootprintTable = records.into_iter().collect();
    if table.len() != total {
        debug!(
            duplicates = total - table.len(),
            "轮廓表存在重复位置键，保留首条"
        );
    }
    Ok(table)
}

/// 读取资产记录（JSON 数组）。
pub fn load_assets(path: &Path) -> Result<Vec<AssetRecord>, IoError> {
    read_json(path)
}

/// 楼层文档整体读写，不支持增量更新。
pub struct FloorDocumentStore {
    path: PathBuf,
}

impl FloorDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<BuilderFloor, IoError> {
        read_json(&self.path)
    }

    pub fn save(&self, floor: &BuilderFloor) -> Result<(), IoError> {
        write_json(&self.path, floor)
    }
}

/// 以格式化 JSON 写出，必要时创建父目录。
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IoError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_text(path, &data)
}

pub fn write_text(path: &Path, data: &str) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, data).map_err(|source| IoError::WriteError {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String, IoError> {
    fs::read_to_string(path).map_err(|source| IoError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    let data = read_text(path)?;
    serde_json::from_str(&data).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })
}
