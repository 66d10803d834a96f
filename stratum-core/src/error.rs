//! Error types for stratum-core
//!
//! Input-format problems, on-disk write failures, configuration mistakes and
//! orchestrator failures each get their own enum so callers can attribute a
//! failure to a specific size string, path or unit.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed size strings and size lists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeError {
    #[error("empty size string")]
    Empty,

    #[error("size list cannot be empty")]
    EmptyList,

    #[error("invalid size format: {input:?}")]
    InvalidNumber { input: String },

    #[error("unrecognized size unit {unit:?} in {input:?}")]
    UnknownUnit { input: String, unit: String },

    #[error("size {input:?} overflows a 64-bit byte count")]
    Overflow { input: String },

    /// Wraps the first bad element of a comma-separated list
    #[error("size #{position} in list: {source}")]
    InList {
        position: usize,
        #[source]
        source: Box<SizeError>,
    },
}

/// Which step of writing content failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStage {
    CreateDir,
    CreateFile,
    Write,
    Flush,
}

impl std::fmt::Display for WriteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WriteStage::CreateDir => "create directory",
            WriteStage::CreateFile => "create file",
            WriteStage::Write => "write",
            WriteStage::Flush => "flush",
        };
        f.write_str(s)
    }
}

/// Failure while materializing a unit on disk
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to {stage} {path:?} ({size} bytes requested): {source}")]
    Io {
        stage: WriteStage,
        path: PathBuf,
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("write to {path:?} cancelled")]
    Cancelled { path: PathBuf },
}

impl WriteError {
    pub fn io(stage: WriteStage, path: impl Into<PathBuf>, size: u64, source: io::Error) -> Self {
        WriteError::Io { stage, path: path.into(), size, source }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WriteError::Cancelled { .. })
    }
}

/// Invalid run configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("chunk size must be at least 1 byte")]
    ZeroChunk,

    #[error("max depth {0} is unreasonably deep (limit {1})")]
    DepthTooLarge(usize, usize),
}

/// Failure of a whole generation batch
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("error creating unit {index}: {source}")]
    Unit {
        index: usize,
        #[source]
        source: WriteError,
    },

    #[error("worker pool needs at least one worker")]
    NoWorkers,

    #[error("failed to spawn worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {id} panicked")]
    WorkerPanicked { id: usize },

    #[error("generation cancelled after {completed} of {total} units")]
    Cancelled { completed: usize, total: usize },

    #[error("result channel closed with {missing} units unaccounted for")]
    ResultsLost { missing: usize },
}

impl GenerateError {
    /// Index of the unit that failed, if the failure belongs to one
    pub fn unit_index(&self) -> Option<usize> {
        match self {
            GenerateError::Unit { index, .. } => Some(*index),
            _ => None,
        }
    }
}

pub type Result<T, E = GenerateError> = std::result::Result<T, E>;
