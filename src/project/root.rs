//! Synchronization passes over the project root.
//!
//! A pass hands out tracked folders, records every file written through
//! them, and at its end deletes the files that were known before the pass
//! but not rewritten. Directories emptied by those deletions are removed
//! bottom-up; the root itself always stays.

use super::folder::{ProjectFolder, WriteLog, list_files, relative_path, to_slash};
use crate::common::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// The project's root directory.
#[derive(Debug, Clone)]
pub struct ProjectRootFolder {
    base: PathBuf,
}

/// Files that existed before a pass.
#[derive(Debug, Clone)]
pub enum KnownFiles {
    /// Every file currently under the root
    Scan,
    /// An explicit set. Relative entries are resolved against the root.
    Listed(BTreeSet<PathBuf>),
}

/// Outcome of [`SyncPass::end`]. All paths are absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub written: BTreeSet<PathBuf>,
    pub deleted: BTreeSet<PathBuf>,
    pub removed_dirs: BTreeSet<PathBuf>,
}

impl ProjectRootFolder {
    /// A relative `base` is anchored at the current directory, so written
    /// and deleted paths can be fed back as [`KnownFiles::Listed`].
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let base = std::path::absolute(&base).unwrap_or(base);
        Self { base }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// An untracked view of the root, for reading.
    pub fn folder(&self) -> ProjectFolder<'static> {
        ProjectFolder::new(self.base.clone())
    }

    /// Start a pass. Nothing is written or deleted until files are written
    /// through the pass's folders or [`SyncPass::end`] runs.
    pub fn begin_pass(&self) -> SyncPass<'_> {
        tracing::debug!(root = %self.base.display(), "starting pass");
        SyncPass {
            root: self,
            log: WriteLog::default(),
            retain: Vec::new(),
        }
    }
}

/// One synchronization run. Dropping a pass without calling [`end`](Self::end)
/// deletes nothing.
#[derive(Debug)]
pub struct SyncPass<'r> {
    root: &'r ProjectRootFolder,
    log: WriteLog,
    retain: Vec<Pattern>,
}

impl<'r> SyncPass<'r> {
    /// Glob patterns, relative to the root, of files the pass never deletes.
    pub fn with_retain_patterns<I, S>(mut self, patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let compiled = Pattern::new(pattern).map_err(|e| {
                Error::InvalidPath(format!("bad retain pattern '{}': {}", pattern, e))
            })?;
            self.retain.push(compiled);
        }
        Ok(self)
    }

    /// The root as a tracked folder.
    pub fn root(&self) -> ProjectFolder<'_> {
        ProjectFolder::tracked(self.root.base.clone(), &self.log)
    }

    /// A tracked folder below the root.
    pub fn folder(&self, rel: &str) -> Result<ProjectFolder<'_>> {
        Ok(ProjectFolder::tracked(
            self.root.base.join(relative_path(rel)?),
            &self.log,
        ))
    }

    /// Mark the existing file at `rel`, or every file below the folder at
    /// `rel`, as written so [`end`](Self::end) keeps it.
    ///
    /// Returns the number of files retained.
    pub fn retain(&self, rel: &str) -> Result<usize> {
        let target = self.root.base.join(relative_path(rel)?);
        if target.is_file() {
            self.log.record(target);
            return Ok(1);
        }
        let files = list_files(&target)?;
        for file in &files {
            self.log.record(target.join(relative_path(file)?));
        }
        tracing::debug!(folder = rel, files = files.len(), "retained previous output");
        Ok(files.len())
    }

    /// Paths written so far.
    pub fn written(&self) -> BTreeSet<PathBuf> {
        self.log.snapshot()
    }

    fn is_retained(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.root.base) else {
            return false;
        };
        let rel = to_slash(rel);
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.retain.iter().any(|p| p.matches_with(&rel, options))
    }

    /// Finish the pass: delete `known` minus the written set, then remove
    /// directories those deletions left empty.
    pub fn end(self, known: KnownFiles) -> Result<PassSummary> {
        let base = self.root.base.clone();
        let known: BTreeSet<PathBuf> = match known {
            KnownFiles::Scan => list_files(&base)?
                .iter()
                .map(|rel| relative_path(rel).map(|rel| base.join(rel)))
                .collect::<Result<_>>()?,
            KnownFiles::Listed(paths) => paths
                .into_iter()
                .map(|p| if p.is_absolute() { p } else { base.join(p) })
                .collect(),
        };

        let orphans: Vec<PathBuf> = known
            .into_iter()
            .filter(|path| path.starts_with(&base) && !self.is_retained(path))
            .filter(|path| !self.log.contains(path))
            .collect();

        let mut deleted = BTreeSet::new();
        for path in orphans {
            if path.is_file() {
                fs::remove_file(&path)?;
                tracing::debug!(path = %path.display(), "deleted orphan");
                deleted.insert(path);
            }
        }

        let removed_dirs = remove_empty_ancestors(&base, &deleted)?;
        let written = self.log.into_inner();

        tracing::info!(
            root = %base.display(),
            written = written.len(),
            deleted = deleted.len(),
            removed_dirs = removed_dirs.len(),
            "pass complete"
        );
        Ok(PassSummary {
            written,
            deleted,
            removed_dirs,
        })
    }
}

/// Remove, deepest first, every now-empty directory between a deleted file
/// and `root`, excluding `root`.
fn remove_empty_ancestors(root: &Path, deleted: &BTreeSet<PathBuf>) -> Result<BTreeSet<PathBuf>> {
    let mut candidates = BTreeSet::new();
    for path in deleted {
        for dir in path.ancestors().skip(1) {
            if dir == root || !dir.starts_with(root) {
                break;
            }
            candidates.insert(dir.to_path_buf());
        }
    }

    let mut ordered: Vec<PathBuf> = candidates.into_iter().collect();
    ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    let mut removed = BTreeSet::new();
    for dir in ordered {
        if dir.is_dir() && fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
            tracing::debug!(dir = %dir.display(), "removed empty directory");
            removed.insert(dir);
        }
    }
    Ok(removed)
}
