//! Lays planned file sizes out as a nested directory tree and writes it.
//!
//! Layout and materialization are separate passes: [`layout`] decides which
//! sizes land in which directory (pure, seedable), [`materialize`] writes the
//! result. Each subtree gets exactly the sizes it writes, so the bytes on
//! disk always add up to the plan total.

use crate::cancel::CancelToken;
use crate::error::{WriteError, WriteStage};
use crate::fill::{FillPattern, Filler, DEFAULT_CHUNK};
use crate::plan::SizeBucketPlan;
use crate::size;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One directory of the planned tree. `path` is relative to the tree root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirectoryNode {
    pub path: PathBuf,
    pub files: Vec<u64>,
    pub children: Vec<DirectoryNode>,
}

impl DirectoryNode {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().sum::<u64>() + self.children.iter().map(|c| c.total_bytes()).sum::<u64>()
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.children.iter().map(|c| c.file_count()).sum::<usize>()
    }

    /// Directories below this one (not counting itself).
    pub fn dir_count(&self) -> usize {
        self.children.iter().map(|c| 1 + c.dir_count()).sum()
    }

    /// Levels of subdirectories below this node.
    pub fn depth(&self) -> usize {
        self.children.iter().map(|c| 1 + c.depth()).max().unwrap_or(0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: usize,
    pub dirs: usize,
    pub bytes: u64,
}

/// Shuffle every planned size once, then split level by level.
pub fn layout<R: Rng + ?Sized>(plan: SizeBucketPlan, max_depth: usize, rng: &mut R) -> DirectoryNode {
    let mut sizes = plan.into_sizes();
    sizes.shuffle(rng);
    layout_level(PathBuf::new(), &sizes, 0, max_depth, rng)
}

fn layout_level<R: Rng + ?Sized>(
    path: PathBuf,
    sizes: &[u64],
    depth: usize,
    max_depth: usize,
    rng: &mut R,
) -> DirectoryNode {
    // a third of the files stay here; small remainders and the deepest level keep all
    let here = if depth >= max_depth || sizes.len() < 3 { sizes.len() } else { sizes.len() / 3 };
    let (files, rest) = sizes.split_at(here);
    let mut node = DirectoryNode { path, files: files.to_vec(), children: Vec::new() };
    if rest.is_empty() {
        return node;
    }

    let subdirs = rng.gen_range(2..=4usize).min(rest.len());
    let per = rest.len() / subdirs;
    for i in 0..subdirs {
        let start = i * per;
        let end = if i + 1 == subdirs { rest.len() } else { start + per };
        let child = node.path.join(format!("dir{}", i + 1));
        node.children.push(layout_level(child, &rest[start..end], depth + 1, max_depth, rng));
    }
    node
}

/// Write `node` (and everything below it) under `root`.
pub fn materialize(
    root: &Path,
    node: &DirectoryNode,
    filler: &Filler,
    cancel: &CancelToken,
) -> Result<TreeStats, WriteError> {
    let dir = root.join(&node.path);
    if cancel.is_cancelled() {
        return Err(WriteError::Cancelled { path: dir });
    }
    fs::create_dir_all(&dir)
        .map_err(|e| WriteError::io(WriteStage::CreateDir, &dir, node.total_bytes(), e))?;

    let mut stats = TreeStats::default();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for &sz in &node.files {
        let base = size::file_name(sz);
        let n = seen.entry(base.clone()).or_insert(0);
        *n += 1;
        let name = if *n == 1 { base } else { format!("{}-{}", base, n) };
        stats.bytes += filler.fill_cancellable(&dir.join(name), sz, cancel)?;
        stats.files += 1;
    }
    for child in &node.children {
        let sub = materialize(root, child, filler, cancel)?;
        stats.files += sub.files;
        stats.dirs += sub.dirs + 1;
        stats.bytes += sub.bytes;
    }
    Ok(stats)
}

/// Lay out `plan` and write it under `root` with pseudorandom content.
pub fn build(root: &Path, plan: SizeBucketPlan, max_depth: usize) -> Result<TreeStats, WriteError> {
    let filler = Filler::new(DEFAULT_CHUNK, FillPattern::Pseudorandom);
    build_with(root, plan, max_depth, &filler, &CancelToken::new())
}

pub fn build_with(
    root: &Path,
    plan: SizeBucketPlan,
    max_depth: usize,
    filler: &Filler,
    cancel: &CancelToken,
) -> Result<TreeStats, WriteError> {
    let tree = layout(plan, max_depth, &mut rand::thread_rng());
    debug!(
        root = %root.display(),
        files = tree.file_count(),
        dirs = tree.dir_count(),
        depth = tree.depth(),
        "tree laid out"
    );
    materialize(root, &tree, filler, cancel)
}
