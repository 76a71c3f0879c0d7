//! Staging area between the crawler, the fetcher and the merge engine
//!
//! Everything produced by a run lands here first and reaches the persistent
//! store only through the merge engine, which deletes staged data after its
//! transaction commits. A run that dies at any point leaves the staging area
//! in a state the next run can pick up.
//!
//! Layout under the staging root:
//!
//! ```text
//! links/<category-name>.json          link batch (ordered sequence/url records)
//! content/<category-name>/<stem>.txt  article body
//! content/<category-name>/<stem>.json artifact manifest, written after the body
//! quarantine/<category-name>/         staged files that could not be imported
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! readers never observe a partially written batch or manifest.

mod content;
mod links;

pub use content::{ArtifactManifest, ContentArtifact, ContentBatch, RejectedFile, StagedArtifact};
pub use links::{LinkBatch, StagedLink};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Version written into link batches and artifact manifests
pub const STAGING_FORMAT_VERSION: u32 = 1;

/// Errors that can occur while reading or writing staged data
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed staging file {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unsupported staging format version {version} in {path}")]
    UnsupportedVersion { path: PathBuf, version: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StagingResult<T> = Result<T, StagingError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Root of the on-disk staging area
#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Opens (and creates if needed) a staging area rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> StagingResult<Self> {
        let area = Self { root: root.into() };
        for dir in [area.links_dir(), area.content_root(), area.quarantine_root()] {
            std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        }
        Ok(area)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn links_dir(&self) -> PathBuf {
        self.root.join("links")
    }

    fn content_root(&self) -> PathBuf {
        self.root.join("content")
    }

    fn quarantine_root(&self) -> PathBuf {
        self.root.join("quarantine")
    }

    /// Directory holding staged artifacts of one category
    pub fn content_dir(&self, category_name: &str) -> PathBuf {
        self.content_root().join(category_name)
    }

    /// Directory holding quarantined files of one category
    pub fn quarantine_dir(&self, category_name: &str) -> PathBuf {
        self.quarantine_root().join(category_name)
    }
}

/// Writes `bytes` to `path` through a temporary file in the same directory
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StagingResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;

    let mut file = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    file.write_all(bytes).map_err(io_error(path))?;
    file.as_file().sync_all().map_err(io_error(path))?;
    file.persist(path).map_err(|e| StagingError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

/// Removes a directory tree, treating "already gone" as success
pub(crate) fn remove_dir_if_exists(path: &Path) -> StagingResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StagingError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::open(dir.path().join("staging")).unwrap();

        assert!(area.root().join("links").is_dir());
        assert!(area.root().join("content").is_dir());
        assert!(area.root().join("quarantine").is_dir());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("file.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        // No temporary siblings left behind
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_remove_missing_dir_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(remove_dir_if_exists(&dir.path().join("absent")).is_ok());
    }
}
