//! Hands the working directory to a container build tool.

use anyhow::{bail, Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Tried in order.
pub const BUILD_TOOLS: [&str; 2] = ["finch", "docker"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packager {
    program: PathBuf,
}

impl Packager {
    /// First of `finch`, `docker` found on `PATH`.
    pub fn detect() -> Result<Self> {
        Self::detect_in(env::var_os("PATH").unwrap_or_default())
    }

    pub fn detect_in(search_path: OsString) -> Result<Self> {
        for tool in BUILD_TOOLS {
            if let Some(program) = find_program(tool, &search_path) {
                return Ok(Self { program });
            }
        }
        bail!("neither finch nor docker found on PATH")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Run `<tool> build -t <tag> .` inside `root`, inheriting stdio.
    pub fn build(&self, root: &Path, tag: &str) -> Result<()> {
        info!(tool = %self.program.display(), tag, "building image");
        let status = Command::new(&self.program)
            .args(["build", "-t", tag, "."])
            .current_dir(root)
            .status()
            .with_context(|| format!("spawn {:?}", self.program))?;
        if !status.success() {
            bail!("{} build failed: {}", self.program.display(), status);
        }
        Ok(())
    }
}

fn find_program(name: &str, search_path: &OsString) -> Option<PathBuf> {
    env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
