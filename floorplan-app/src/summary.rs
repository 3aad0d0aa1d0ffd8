//! 导入完成后打印到标准输出的摘要。

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use floorplan_engine::ingest::IngestReport;
use sha2::{Digest, Sha256};

/// 输出文件的大小与摘要，重复运行时可直接比对。
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
}

impl OutputFile {
    pub fn inspect(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("无法读取输出文件 {}", path.display()))?;
        let digest = Sha256::digest(&data);
        Ok(Self {
            path: path.to_path_buf(),
            bytes: data.len() as u64,
            sha256: format!("{digest:x}"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    report: IngestReport,
    blocks: usize,
    outputs: Vec<OutputFile>,
}

impl Summary {
    pub fn new(report: IngestReport, blocks: usize, outputs: Vec<OutputFile>) -> Self {
        Self {
            report,
            blocks,
            outputs,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = &self.report;
        writeln!(
            f,
            "entities: {} read, {} kept, {} dropped",
            report.source_entities,
            report.kept(),
            report.total_dropped()
        )?;

        writeln!(f, "groups:")?;
        for (group, count) in &report.kept_by_group {
            writeln!(f, "  {group:<16}{count:>6}")?;
        }
        writeln!(f, "kinds:")?;
        for (kind, count) in &report.kept_by_kind {
            writeln!(f, "  {kind:<16}{count:>6}")?;
        }
        if !report.dropped.is_empty() {
            writeln!(f, "dropped:")?;
            for (reason, count) in &report.dropped {
                writeln!(f, "  {:<20}{count:>6}", reason.as_str())?;
            }
        }
        writeln!(f, "blocks with bounds: {}", self.blocks)?;

        writeln!(f, "outputs:")?;
        for output in &self.outputs {
            writeln!(
                f,
                "  {} ({} bytes) sha256 {}",
                output.path.display(),
                output.bytes,
                output.sha256
            )?;
        }
        Ok(())
    }
}
