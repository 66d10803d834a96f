use crate::unit::unit_dir_name;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const DESCRIPTOR_NAME: &str = "Dockerfile";

/// `FROM scratch` plus one `ADD unit<N> /` per unit, in unit order.
pub fn render_descriptor(unit_count: usize) -> String {
    let mut out = String::from("FROM scratch\n");
    for i in 1..=unit_count {
        out.push_str(&format!("ADD {} /\n", unit_dir_name(i)));
    }
    out
}

pub fn write_descriptor(root: &Path, unit_count: usize) -> Result<PathBuf> {
    let path = root.join(DESCRIPTOR_NAME);
    fs::write(&path, render_descriptor(unit_count))
        .with_context(|| format!("write descriptor {:?}", path))?;
    tracing::debug!(path = %path.display(), units = unit_count, "descriptor written");
    Ok(path)
}
