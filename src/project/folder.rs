//! File-system facade over a project directory.

use crate::common::bom::Bom;
use crate::common::{Error, Result};
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Set of absolute paths written during a pass.
#[derive(Debug, Default)]
pub(crate) struct WriteLog {
    paths: RefCell<BTreeSet<PathBuf>>,
}

impl WriteLog {
    /// Record a path. Recording the same path twice keeps one entry.
    pub(crate) fn record(&self, path: PathBuf) {
        self.paths.borrow_mut().insert(path);
    }

    pub(crate) fn contains(&self, path: &Path) -> bool {
        self.paths.borrow().contains(path)
    }

    pub(crate) fn snapshot(&self) -> BTreeSet<PathBuf> {
        self.paths.borrow().clone()
    }

    pub(crate) fn into_inner(self) -> BTreeSet<PathBuf> {
        self.paths.into_inner()
    }
}

/// Turn a relative path into a clean relative `PathBuf`.
///
/// Leading separators are dropped, `.` segments are skipped, and `..` or
/// drive-qualified segments are rejected.
pub(crate) fn relative_path(rel: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for segment in rel.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::InvalidPath(format!(
                    "'{}' leaves its folder",
                    rel
                )));
            },
            s if s.contains(':') => {
                return Err(Error::InvalidPath(format!(
                    "'{}' is not a relative path",
                    rel
                )));
            },
            s => out.push(s),
        }
    }
    Ok(out)
}

/// A directory of the project, by absolute path.
///
/// Obtaining a folder performs no I/O and the directory need not exist.
/// Folders handed out by a [`SyncPass`](super::SyncPass) report every file
/// they write to that pass.
#[derive(Debug, Clone)]
pub struct ProjectFolder<'a> {
    base: PathBuf,
    log: Option<&'a WriteLog>,
}

impl ProjectFolder<'static> {
    /// An untracked folder. Writes through it are not part of any pass.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            log: None,
        }
    }
}

impl<'a> ProjectFolder<'a> {
    pub(crate) fn tracked(base: PathBuf, log: &'a WriteLog) -> Self {
        Self {
            base,
            log: Some(log),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Whether the directory currently exists.
    pub fn exists(&self) -> bool {
        self.base.is_dir()
    }

    /// A sub-folder, sharing this folder's pass.
    pub fn folder(&self, name: &str) -> Result<ProjectFolder<'a>> {
        Ok(ProjectFolder {
            base: self.base.join(relative_path(name)?),
            log: self.log,
        })
    }

    /// A file below this folder.
    pub fn file(&self, rel: &str) -> Result<ProjectFile<'a>> {
        Ok(ProjectFile {
            path: self.resolve(rel)?,
            log: self.log,
        })
    }

    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = relative_path(rel)?;
        if rel_path.as_os_str().is_empty() {
            return Err(Error::InvalidPath(format!("'{}' names no file", rel)));
        }
        Ok(self.base.join(rel_path))
    }

    /// Write a file through `producer` and record it in the pass.
    ///
    /// Missing parent directories are created. A directory sitting at the
    /// target path is removed first, with everything below it. The sink is
    /// flushed and closed before this returns.
    pub fn write<F>(&self, rel: &str, producer: F) -> Result<PathBuf>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        let path = self.resolve(rel)?;
        write_file(&path, producer)?;
        if let Some(log) = self.log {
            log.record(path.clone());
        }
        Ok(path)
    }

    pub fn write_bytes(&self, rel: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.write(rel, |sink| Ok(sink.write_all(bytes)?))
    }

    /// Write UTF-8 text without a BOM.
    pub fn write_text(&self, rel: &str, text: &str) -> Result<PathBuf> {
        self.write_bytes(rel, text.as_bytes())
    }

    /// Write `value` as pretty JSON with two-space indentation and a
    /// trailing newline.
    pub fn write_json<T: Serialize + ?Sized>(&self, rel: &str, value: &T) -> Result<PathBuf> {
        self.write(rel, |sink| {
            serde_json::to_writer_pretty(&mut *sink, value)?;
            sink.write_all(b"\n")?;
            Ok(())
        })
    }

    /// Run `handler` over the file's content if it exists.
    ///
    /// Returns `false` without calling `handler` when the file is absent.
    /// The stream is closed before this returns.
    pub fn try_read<F>(&self, rel: &str, handler: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        read_file(&self.resolve(rel)?, handler)
    }

    pub fn read_bytes(&self, rel: &str) -> Result<Option<Vec<u8>>> {
        let mut bytes = Vec::new();
        let found = self.try_read(rel, |source| {
            source.read_to_end(&mut bytes)?;
            Ok(())
        })?;
        Ok(found.then_some(bytes))
    }

    /// Read UTF-8 text, dropping a leading BOM.
    pub fn read_text(&self, rel: &str) -> Result<Option<String>> {
        match self.read_bytes(rel)? {
            Some(bytes) => {
                let text = std::str::from_utf8(Bom::Utf8.strip(&bytes))?;
                Ok(Some(text.to_string()))
            },
            None => Ok(None),
        }
    }

    pub fn read_json<T: DeserializeOwned>(&self, rel: &str) -> Result<Option<T>> {
        match self.read_text(rel)? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    /// Relative `/`-separated paths of the files below this folder matching
    /// `pattern`, sorted. `*` does not cross directories; `**` does.
    pub fn files(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)
            .map_err(|e| Error::InvalidPath(format!("bad pattern '{}': {}", pattern, e)))?;
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };

        let mut files = Vec::new();
        for rel in list_files(&self.base)? {
            if pattern.matches_with(&rel, options) {
                files.push(rel);
            }
        }
        Ok(files)
    }

    /// Names of the direct sub-directories, sorted.
    pub fn sub_folders(&self) -> Result<Vec<String>> {
        if !self.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// A file inside a project folder.
#[derive(Debug, Clone)]
pub struct ProjectFile<'a> {
    path: PathBuf,
    log: Option<&'a WriteLog>,
}

impl ProjectFile<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Delete the file. Returns whether there was one.
    pub fn delete(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }

    pub fn read<F>(&self, handler: F) -> Result<bool>
    where
        F: FnOnce(&mut dyn Read) -> Result<()>,
    {
        read_file(&self.path, handler)
    }

    pub fn write<F>(&self, producer: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Write) -> Result<()>,
    {
        write_file(&self.path, producer)?;
        if let Some(log) = self.log {
            log.record(self.path.clone());
        }
        Ok(())
    }
}

fn write_file<F>(path: &Path, producer: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.is_dir() {
        tracing::debug!(path = %path.display(), "replacing directory with file");
        fs::remove_dir_all(path)?;
    }

    let mut sink = BufWriter::new(File::create(path)?);
    producer(&mut sink)?;
    sink.flush()?;
    tracing::debug!(path = %path.display(), "wrote file");
    Ok(())
}

fn read_file<F>(path: &Path, handler: F) -> Result<bool>
where
    F: FnOnce(&mut dyn Read) -> Result<()>,
{
    if !path.is_file() {
        return Ok(false);
    }
    let mut source = BufReader::new(File::open(path)?);
    handler(&mut source)?;
    Ok(true)
}

/// Every file below `base` as a sorted relative `/`-separated path.
pub(crate) fn list_files(base: &Path) -> Result<Vec<String>> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(base).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(base) {
            files.push(to_slash(rel));
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
