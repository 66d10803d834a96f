//! Filler content for synthetic payload files.
//!
//! Files are written in fixed-size chunks from a single reusable buffer, so
//! memory stays at one chunk no matter how large the file is.

use crate::cancel::CancelToken;
use crate::error::{WriteError, WriteStage};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::trace;

pub const DEFAULT_CHUNK: usize = 10 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillPattern {
    /// Every byte is the same value; cheapest to produce.
    Constant(u8),
    /// Non-cryptographic noise, so payloads do not compress to nothing.
    Pseudorandom,
}

impl FillPattern {
    fn chunk(self, len: usize) -> Vec<u8> {
        match self {
            FillPattern::Constant(b) => vec![b; len],
            FillPattern::Pseudorandom => {
                let mut buf = vec![0u8; len];
                SmallRng::from_entropy().fill_bytes(&mut buf);
                buf
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Filler {
    pub chunk_size: usize,
    pub pattern: FillPattern,
}

impl Default for Filler {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK, pattern: FillPattern::Constant(b'x') }
    }
}

impl Filler {
    pub fn new(chunk_size: usize, pattern: FillPattern) -> Self {
        Self { chunk_size: chunk_size.max(1), pattern }
    }

    /// Create `path` (and its parents) holding exactly `size` bytes.
    pub fn fill(&self, path: &Path, size: u64) -> Result<u64, WriteError> {
        self.fill_cancellable(path, size, &CancelToken::new())
    }

    /// Like [`Filler::fill`] but stops before the next chunk once `cancel` is set.
    /// A token set before the call leaves the filesystem untouched; a write
    /// interrupted midway leaves its partial file on disk.
    pub fn fill_cancellable(
        &self,
        path: &Path,
        size: u64,
        cancel: &CancelToken,
    ) -> Result<u64, WriteError> {
        if cancel.is_cancelled() {
            return Err(WriteError::Cancelled { path: path.to_path_buf() });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| WriteError::io(WriteStage::CreateDir, parent, size, e))?;
        }
        let file =
            File::create(path).map_err(|e| WriteError::io(WriteStage::CreateFile, path, size, e))?;
        let mut out = BufWriter::new(file);

        let buf = self.pattern.chunk(size.min(self.chunk_size.max(1) as u64) as usize);
        let mut remaining = size;
        while remaining > 0 {
            if cancel.is_cancelled() {
                return Err(WriteError::Cancelled { path: path.to_path_buf() });
            }
            let n = remaining.min(buf.len() as u64) as usize;
            out.write_all(&buf[..n])
                .map_err(|e| WriteError::io(WriteStage::Write, path, size, e))?;
            remaining -= n as u64;
        }
        out.flush().map_err(|e| WriteError::io(WriteStage::Flush, path, size, e))?;
        trace!(path = %path.display(), size, "filled");
        Ok(size)
    }
}
