//! Storage writer for the mirrored output tree
//!
//! Persists fetched bytes under the output root at the paths produced by
//! the URL mapper. Writes are atomic per file (write to a temp sibling,
//! then rename), so an interrupted run never leaves a corrupt file, and
//! re-runs overwrite in place instead of duplicating.

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Storage-specific errors. Fatal for the single resource being written,
/// never for the crawl.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to move {path} into place: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path {0} escapes the output root")]
    PathEscape(PathBuf),
}

/// Writes mirrored files under a fixed output root.
#[derive(Debug, Clone)]
pub struct StorageWriter {
    root: PathBuf,
}

impl StorageWriter {
    /// Creates the output root if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StorageError::CreateDir {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` at `rel_path` under the root, creating intermediate
    /// directories as needed. Overwrites any prior content for the same
    /// path. Returns the absolute path written.
    pub async fn write(&self, rel_path: &Path, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        ensure_within_root(rel_path)?;
        let target = self.root.join(rel_path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        // Atomic per file: a reader never observes a half-written mirror.
        let tmp = temp_sibling(&target);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|source| StorageError::Rename {
                path: target.clone(),
                source,
            })?;

        Ok(target)
    }
}

fn temp_sibling(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Mapped paths are always relative and descend from the root; anything
/// else indicates a mapping bug and is refused rather than written.
fn ensure_within_root(rel_path: &Path) -> Result<(), StorageError> {
    let escapes = rel_path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes || rel_path.as_os_str().is_empty() {
        return Err(StorageError::PathEscape(rel_path.to_path_buf()));
    }
    Ok(())
}
