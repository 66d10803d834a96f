use crate::orchestrator::{GenerateReport, UnitRecord};
use crate::unit::GenerationMode;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON summary of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub created_utc: String,
    pub working_dir: PathBuf,
    pub mode: GenerationMode,
    /// Sorted by unit index.
    pub units: Vec<UnitRecord>,
    pub total_bytes: u64,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn new(working_dir: &Path, mode: GenerationMode, generated: &GenerateReport) -> Self {
        let mut units = generated.units.clone();
        units.sort_by_key(|u| u.index);
        Self {
            created_utc: chrono::Utc::now().to_rfc3339(),
            working_dir: working_dir.to_path_buf(),
            mode,
            units,
            total_bytes: generated.total_bytes,
            elapsed_ms: generated.elapsed.as_millis() as u64,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut f = File::create(path).with_context(|| format!("create report {:?}", path))?;
        f.write_all(serde_json::to_string_pretty(self)?.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(())
    }
}
