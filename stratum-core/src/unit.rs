//! Units: one requested size, one generated artifact.

use crate::cancel::CancelToken;
use crate::error::{WriteError, WriteStage};
use crate::fill::{FillPattern, Filler, DEFAULT_CHUNK};
use crate::plan;
use crate::size;
use crate::tree;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// How every unit of a run is produced. Picked once per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GenerationMode {
    /// One payload file per unit.
    #[default]
    SingleFile,
    /// A nested tree per unit; `target_files: None` derives a count from the size.
    Tree { max_depth: usize, target_files: Option<usize> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitJob {
    /// 1-based, matches the position in the size list
    pub index: usize,
    pub dir: PathBuf,
    pub size: u64,
}

/// What a finished unit put on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UnitStats {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
}

#[derive(Debug)]
pub struct UnitResult {
    pub index: usize,
    pub elapsed: Duration,
    pub outcome: Result<UnitStats, WriteError>,
}

/// Directory name for unit `index`.
pub fn unit_dir_name(index: usize) -> String {
    format!("unit{}", index)
}

/// One job per size, in input order, rooted at `root/unit<N>`.
pub fn jobs_for(root: &Path, sizes: &[u64]) -> Vec<UnitJob> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| UnitJob { index: i + 1, dir: root.join(unit_dir_name(i + 1)), size })
        .collect()
}

/// Produces the content of a single unit.
pub trait UnitGenerator: Sync {
    fn generate(&self, job: &UnitJob, cancel: &CancelToken) -> Result<UnitStats, WriteError>;
}

/// The standard generator: single files or planned trees.
#[derive(Clone, Debug)]
pub struct ModeGenerator {
    mode: GenerationMode,
    chunk_size: usize,
}

impl ModeGenerator {
    pub fn new(mode: GenerationMode) -> Self {
        Self { mode, chunk_size: DEFAULT_CHUNK }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }
}

impl UnitGenerator for ModeGenerator {
    fn generate(&self, job: &UnitJob, cancel: &CancelToken) -> Result<UnitStats, WriteError> {
        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled { path: job.dir.clone() });
        }
        fs::create_dir_all(&job.dir)
            .map_err(|e| WriteError::io(WriteStage::CreateDir, &job.dir, job.size, e))?;
        match self.mode {
            GenerationMode::SingleFile => {
                let filler = Filler::new(self.chunk_size, FillPattern::Constant(b'x'));
                let path = job.dir.join(size::file_name(job.size));
                let bytes = filler.fill_cancellable(&path, job.size, cancel)?;
                debug!(unit = job.index, path = %path.display(), bytes, "unit file written");
                Ok(UnitStats { files: 1, dirs: 0, bytes })
            }
            GenerationMode::Tree { max_depth, target_files } => {
                let target = target_files
                    .filter(|&n| n > 0)
                    .unwrap_or_else(|| plan::default_target_files(job.size));
                let planned = plan::plan(job.size, target);
                debug!(
                    unit = job.index,
                    very_large = planned.very_large.len(),
                    large = planned.large.len(),
                    medium = planned.medium.len(),
                    small = planned.small.len(),
                    "unit planned"
                );
                let filler = Filler::new(self.chunk_size, FillPattern::Pseudorandom);
                let stats = tree::build_with(&job.dir, planned, max_depth, &filler, cancel)?;
                Ok(UnitStats { files: stats.files, dirs: stats.dirs, bytes: stats.bytes })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_follow_input_order() {
        let jobs = jobs_for(Path::new("/w"), &[5, 7, 9]);
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0], UnitJob { index: 1, dir: PathBuf::from("/w/unit1"), size: 5 });
        assert_eq!(jobs[2].index, 3);
        assert_eq!(jobs[2].dir, PathBuf::from("/w/unit3"));
        assert_eq!(jobs[2].size, 9);
    }

    #[test]
    fn single_file_unit_holds_one_named_file() {
        let td = tempfile::tempdir().unwrap();
        let job = UnitJob { index: 1, dir: td.path().join("unit1"), size: 512 * 1024 };
        let stats = ModeGenerator::new(GenerationMode::SingleFile)
            .generate(&job, &CancelToken::new())
            .unwrap();
        assert_eq!(stats, UnitStats { files: 1, dirs: 0, bytes: 512 * 1024 });
        let entries: Vec<_> = fs::read_dir(&job.dir).unwrap().map(|e| e.unwrap().path()).collect();
        assert_eq!(entries, vec![job.dir.join("512.00KB-file")]);
        assert_eq!(fs::metadata(&entries[0]).unwrap().len(), 512 * 1024);
    }

    #[test]
    fn zero_byte_unit_still_gets_a_file() {
        let td = tempfile::tempdir().unwrap();
        let job = UnitJob { index: 4, dir: td.path().join("unit4"), size: 0 };
        ModeGenerator::new(GenerationMode::SingleFile).generate(&job, &CancelToken::new()).unwrap();
        assert!(job.dir.join("0bytes-file").is_file());
    }

    #[test]
    fn tree_unit_matches_size() {
        let td = tempfile::tempdir().unwrap();
        let job = UnitJob { index: 2, dir: td.path().join("unit2"), size: 10 * 1024 };
        let mode = GenerationMode::Tree { max_depth: 2, target_files: Some(3) };
        let stats = ModeGenerator::new(mode).generate(&job, &CancelToken::new()).unwrap();
        assert!(stats.files >= 1);
        assert_eq!(stats.bytes, 10 * 1024);
    }

    #[test]
    fn cancelled_unit_leaves_no_directory() {
        let td = tempfile::tempdir().unwrap();
        let token = CancelToken::new();
        token.cancel();
        for mode in [
            GenerationMode::SingleFile,
            GenerationMode::Tree { max_depth: 2, target_files: Some(4) },
        ] {
            let job = UnitJob { index: 5, dir: td.path().join("unit5"), size: 8 * 1024 };
            let err = ModeGenerator::new(mode).generate(&job, &token).unwrap_err();
            assert!(err.is_cancelled());
            assert!(!job.dir.exists(), "{mode:?}");
        }
    }
}
