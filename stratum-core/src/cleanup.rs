//! Ownership of the top-level working directory.
//!
//! The directory is removed at most once, by whichever trigger gets there
//! first: an interrupt, normal completion, or an explicit release that keeps
//! it on disk. Removal failures are logged and never fatal.

use crate::cancel::CancelToken;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Conventional exit status after SIGINT.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

const REMOVE_ATTEMPTS: u32 = 5;
const REMOVE_BACKOFF: Duration = Duration::from_millis(50);

/// Create a fresh `stratum-XXXXXX` directory under `prefix` (or the system
/// temp dir). The directory is not removed automatically.
pub fn create_workdir(prefix: Option<&Path>) -> io::Result<PathBuf> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("stratum-");
    let dir = match prefix {
        Some(p) => {
            fs::create_dir_all(p)?;
            builder.tempdir_in(p)?
        }
        None => builder.tempdir()?,
    };
    Ok(dir.keep())
}

#[derive(Debug)]
pub struct CleanupGuard {
    dir: Mutex<Option<PathBuf>>,
    interrupted: AtomicBool,
}

impl CleanupGuard {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Mutex::new(Some(dir.into())), interrupted: AtomicBool::new(false) }
    }

    /// Directory still owned by the guard, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    pub fn is_done(&self) -> bool {
        self.lock().is_none()
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Cleanup triggered by a signal. Returns `true` if this call removed the directory.
    pub fn interrupt(&self) -> bool {
        self.interrupt_with(|| {})
    }

    /// Like [`CleanupGuard::interrupt`], running `on_claim` after the
    /// interrupted flag is set and before removal starts, all under the lock.
    pub fn interrupt_with(&self, on_claim: impl FnOnce()) -> bool {
        let mut slot = self.lock();
        self.interrupted.store(true, Ordering::SeqCst);
        on_claim();
        Self::remove(&mut slot, "interrupt")
    }

    /// Cleanup at the end of a normal run. Returns `true` if this call removed the directory.
    pub fn complete(&self) -> bool {
        let mut slot = self.lock();
        Self::remove(&mut slot, "completion")
    }

    /// Give the directory back to the caller without deleting it.
    pub fn release(&self) -> Option<PathBuf> {
        self.lock().take()
    }

    /// Block until a removal in progress on another thread has finished.
    pub fn wait_done(&self) {
        drop(self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, Option<PathBuf>> {
        self.dir.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(slot: &mut Option<PathBuf>, trigger: &str) -> bool {
        let Some(dir) = slot.take() else {
            return false;
        };
        // A worker that has not yet seen the cancel token can still add an
        // entry mid-removal; retry a few times before giving up.
        let mut attempt = 1;
        loop {
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(dir = %dir.display(), trigger, "removed working directory");
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) if attempt < REMOVE_ATTEMPTS => {
                    debug!(dir = %dir.display(), attempt, error = %e, "retrying removal");
                    thread::sleep(REMOVE_BACKOFF);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(dir = %dir.display(), trigger, error = %e, "failed to clean up working directory");
                    break;
                }
            }
        }
        true
    }
}

/// On SIGINT/SIGTERM: flag the interrupt, stop workers, remove the working
/// directory once, exit 130.
pub fn install_interrupt_handler(
    guard: Arc<CleanupGuard>,
    cancel: CancelToken,
) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if guard.interrupt_with(|| cancel.cancel()) {
            eprintln!("\nInterrupt received, working directory cleaned up");
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
}
