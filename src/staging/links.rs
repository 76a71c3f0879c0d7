//! Staged link batches

use super::{io_error, write_atomic, StagingArea, StagingError, StagingResult, STAGING_FORMAT_VERSION};
use crate::storage::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;

/// A discovered link waiting to be merged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedLink {
    pub sequence: i64,
    pub category_id: i64,
    pub url: String,
}

/// All staged links of one category, in sequence order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkBatch {
    pub version: u32,
    pub category_id: i64,
    pub category_name: String,
    pub staged_at: DateTime<Utc>,
    pub links: Vec<StagedLink>,
}

impl LinkBatch {
    fn empty(category: &Category) -> Self {
        Self {
            version: STAGING_FORMAT_VERSION,
            category_id: category.id,
            category_name: category.name(),
            staged_at: Utc::now(),
            links: Vec::new(),
        }
    }

    /// Highest sequence number in the batch
    pub fn max_sequence(&self) -> Option<i64> {
        self.links.iter().map(|link| link.sequence).max()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.url.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }
}

impl StagingArea {
    fn link_batch_path(&self, category_name: &str) -> PathBuf {
        self.links_dir().join(format!("{}.json", category_name))
    }

    /// Reads the staged link batch of a category, if one exists
    pub fn read_link_batch(&self, category_name: &str) -> StagingResult<Option<LinkBatch>> {
        let path = self.link_batch_path(category_name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };

        let batch: LinkBatch = serde_json::from_slice(&raw)
            .map_err(|source| StagingError::Malformed { path: path.clone(), source })?;

        if batch.version != STAGING_FORMAT_VERSION {
            return Err(StagingError::UnsupportedVersion {
                path,
                version: batch.version,
            });
        }

        Ok(Some(batch))
    }

    /// Appends newly discovered links to the category's batch
    ///
    /// Sequence numbers continue after `last_stored_sequence` or after the
    /// highest sequence already staged, whichever is larger. Links already in
    /// the batch are not staged twice. Returns the batch as written.
    pub fn stage_links(
        &self,
        category: &Category,
        links: &BTreeSet<String>,
        last_stored_sequence: i64,
    ) -> StagingResult<LinkBatch> {
        let name = category.name();
        let mut batch = self
            .read_link_batch(&name)?
            .unwrap_or_else(|| LinkBatch::empty(category));

        let already: HashSet<String> = batch.urls().map(str::to_string).collect();
        let before = batch.len();
        let mut next = batch
            .max_sequence()
            .unwrap_or(0)
            .max(last_stored_sequence)
            + 1;

        for url in links.iter().filter(|url| !already.contains(*url)) {
            batch.links.push(StagedLink {
                sequence: next,
                category_id: category.id,
                url: url.clone(),
            });
            next += 1;
        }

        batch.staged_at = Utc::now();
        let bytes = serde_json::to_vec_pretty(&batch)?;
        write_atomic(&self.link_batch_path(&name), &bytes)?;

        tracing::info!(
            "[{}] {} new links staged ({} pending in batch)",
            name,
            batch.len() - before,
            batch.len()
        );
        Ok(batch)
    }

    /// Names of every category with a staged link batch
    pub fn list_link_batches(&self) -> StagingResult<Vec<String>> {
        let dir = self.links_dir();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes a category's link batch; a missing batch is not an error
    pub fn remove_link_batch(&self, category_name: &str) -> StagingResult<()> {
        let path = self.link_batch_path(category_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path)(e)),
        }
    }
}
