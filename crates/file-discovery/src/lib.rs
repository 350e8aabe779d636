//! Document discovery: a lazy, recursive walk of a source tree that yields a
//! [`FileTask`] for every file with a supported extension.
//!
//! Lock files that office applications leave next to open documents (names
//! starting with `~$`) are always skipped, whatever their extension. The walk
//! has no side effects; unreadable entries are logged and skipped.

use core_types::config::DiscoveryConfig;
use core_types::{FileTask, FormatTag};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

/// Errors raised before the walk starts. Problems inside the tree are not
/// errors; they are logged and the entry is skipped.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("source directory does not exist: {0}")]
    MissingRoot(PathBuf),
    #[error("source path is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Filter applied to every walked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRules {
    extensions: BTreeSet<String>,
    lock_prefix: String,
}

impl DiscoveryRules {
    pub fn new<I, S>(extensions: I, lock_prefix: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| FormatTag::new(e.as_ref()).as_str().to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            lock_prefix: lock_prefix.into(),
        }
    }

    pub fn from_config(cfg: &DiscoveryConfig) -> Self {
        Self::new(&cfg.extensions, cfg.lock_prefix.clone())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    pub fn is_lock_file(&self, file_name: &str) -> bool {
        !self.lock_prefix.is_empty() && file_name.starts_with(&self.lock_prefix)
    }

    /// True when `path` names a file this batch should process.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        if self.is_lock_file(&name.to_string_lossy()) {
            return false;
        }
        FormatTag::from_path(path).is_some_and(|tag| self.extensions.contains(tag.as_str()))
    }
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        Self::from_config(&DiscoveryConfig::default())
    }
}

/// Lazy iterator over the accepted files below a root, in file-name order
/// within each directory.
pub struct Discovery {
    walk: walkdir::IntoIter,
    rules: DiscoveryRules,
}

impl Iterator for Discovery {
    type Item = FileTask;

    fn next(&mut self) -> Option<FileTask> {
        loop {
            match self.walk.next()? {
                Ok(entry) => {
                    let is_file = entry.file_type().is_file()
                        || (entry.path_is_symlink() && entry.path().is_file());
                    if is_file && self.rules.accepts(entry.path()) {
                        return Some(FileTask::new(entry.into_path()));
                    }
                }
                Err(err) => {
                    let path = err.path().map(|p| p.display().to_string());
                    warn!(path = ?path, error = %err, "skipping unreadable entry");
                }
            }
        }
    }
}

/// Start a walk below `root`. Paths of the yielded tasks are absolute.
pub fn discover(root: &Path, rules: &DiscoveryRules) -> Result<Discovery, DiscoveryError> {
    let meta = match std::fs::metadata(root) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(DiscoveryError::MissingRoot(root.to_path_buf()));
        }
        Err(source) => {
            return Err(DiscoveryError::Io {
                path: root.to_path_buf(),
                source,
            });
        }
    };
    if !meta.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }
    let absolute = std::path::absolute(root).map_err(|source| DiscoveryError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let walk = WalkDir::new(absolute)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();
    Ok(Discovery {
        walk,
        rules: rules.clone(),
    })
}

/// Anything that can hand the orchestrator a stream of tasks.
pub trait FileSource: Send + Sync {
    fn tasks(&self) -> Result<Box<dyn Iterator<Item = FileTask> + '_>, DiscoveryError>;
}

/// Filesystem-backed source.
#[derive(Debug, Clone)]
pub struct WalkSource {
    root: PathBuf,
    rules: DiscoveryRules,
}

impl WalkSource {
    pub fn new(root: impl Into<PathBuf>, rules: DiscoveryRules) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSource for WalkSource {
    fn tasks(&self) -> Result<Box<dyn Iterator<Item = FileTask> + '_>, DiscoveryError> {
        Ok(Box::new(discover(&self.root, &self.rules)?))
    }
}

/// Fixed list of tasks; useful for tests and for re-running a known set.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tasks: Vec<FileTask>,
}

impl InMemorySource {
    pub fn new(tasks: Vec<FileTask>) -> Self {
        Self { tasks }
    }
}

impl FileSource for InMemorySource {
    fn tasks(&self) -> Result<Box<dyn Iterator<Item = FileTask> + '_>, DiscoveryError> {
        Ok(Box::new(self.tasks.iter().cloned()))
    }
}
