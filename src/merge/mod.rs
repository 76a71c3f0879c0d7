//! Merge engine: the only writer of the persistent store
//!
//! Staged link batches and content artifacts are reconciled into the store one
//! category at a time, each in a single transaction. Staged data is deleted
//! only after that transaction commits, so an interrupted merge is simply
//! retried by the next run: rows already committed are skipped as duplicates
//! and the deletion happens then.

use crate::staging::{ContentBatch, LinkBatch, RejectedFile, StagedArtifact, StagingArea};
use crate::storage::{lock_storage, Category, ContentRow, SharedStorage, Storage};
use crate::HarvestError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Rows written and rows ignored by one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub skipped: usize,
}

impl std::ops::AddAssign for MergeReport {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
    }
}

/// Outcome of merging every staged batch of one kind
#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    /// Per-category reports, keyed by category name
    pub reports: BTreeMap<String, MergeReport>,
    /// Staged batches whose name matches no category; left in place
    pub unresolved: Vec<String>,
    /// Categories whose merge failed and was rolled back; left in place
    pub failed: Vec<String>,
}

impl MergeSummary {
    pub fn totals(&self) -> MergeReport {
        let mut total = MergeReport::default();
        for report in self.reports.values() {
            total += *report;
        }
        total
    }
}

/// Reconciles the staging area into the store
#[derive(Clone)]
pub struct MergeEngine {
    storage: SharedStorage,
    staging: StagingArea,
    archive_dir: Option<PathBuf>,
}

impl MergeEngine {
    pub fn new(storage: SharedStorage, staging: StagingArea) -> Self {
        Self {
            storage,
            staging,
            archive_dir: None,
        }
    }

    /// Copies merged article bodies to `<dir>/<category-name>/`
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    /// Merges one staged link batch and deletes it after commit
    pub fn merge_links(
        &self,
        category: &Category,
        batch: &LinkBatch,
    ) -> Result<MergeReport, HarvestError> {
        let name = category.name();
        let mut storage = lock_storage(&self.storage)?;

        let inserted = storage.insert_links(category.id, &batch.links)?;
        tracing::info!(
            "[{}] Merged links: {} inserted, {} duplicates skipped",
            name,
            inserted.inserted,
            inserted.skipped
        );

        self.staging.remove_link_batch(&name)?;

        Ok(MergeReport {
            inserted: inserted.inserted,
            skipped: inserted.skipped,
        })
    }

    /// Merges one category's staged artifacts and deletes them after commit
    ///
    /// Rejected files are moved to quarantine once the transaction commits.
    pub fn merge_content(
        &self,
        category: &Category,
        batch: &ContentBatch,
    ) -> Result<MergeReport, HarvestError> {
        let name = category.name();

        let (accepted, foreign): (Vec<&StagedArtifact>, Vec<&StagedArtifact>) = batch
            .artifacts
            .iter()
            .partition(|artifact| artifact.manifest.category_id == category.id);

        let mut rejected = batch.rejected.clone();
        for artifact in foreign {
            let reason = format!(
                "staged for category {}, not {}",
                artifact.manifest.category_id, category.id
            );
            rejected.push(RejectedFile {
                path: artifact.manifest_path.clone(),
                reason: reason.clone(),
            });
            rejected.push(RejectedFile {
                path: artifact.body_path.clone(),
                reason,
            });
        }

        for file in &rejected {
            tracing::warn!("[{}] Skipping {}: {}", name, file.path.display(), file.reason);
        }

        let rows: Vec<ContentRow> = accepted
            .iter()
            .map(|artifact| ContentRow {
                category_id: category.id,
                publish_timestamp: artifact.manifest.publish_timestamp.clone(),
                title: artifact.manifest.title.clone(),
                body: artifact.body.clone(),
                url: Some(artifact.manifest.url.clone()),
            })
            .collect();

        let mut storage = lock_storage(&self.storage)?;
        let inserted = storage.insert_contents(category.id, &rows)?;
        tracing::info!(
            "[{}] Merged contents: {} inserted, {} duplicates skipped",
            name,
            inserted.inserted,
            inserted.skipped
        );

        if !rejected.is_empty() {
            let moved = self.staging.quarantine(&name, &rejected)?;
            tracing::warn!("[{}] {} files moved to quarantine", name, moved);
        }

        if let Some(archive_dir) = &self.archive_dir {
            archive_bodies(&archive_dir.join(&name), &accepted);
        }

        self.staging.remove_content_batch(&name)?;

        Ok(MergeReport {
            inserted: inserted.inserted,
            skipped: inserted.skipped,
        })
    }

    /// Merges every staged link batch
    ///
    /// A failing category is rolled back and reported; the others proceed.
    pub fn merge_all_links(&self) -> Result<MergeSummary, HarvestError> {
        let categories = self.categories_by_name()?;
        let mut summary = MergeSummary::default();

        for name in self.staging.list_link_batches()? {
            let Some(category) = categories.get(&name) else {
                tracing::warn!("Unknown category '{}' in staged links, skipping", name);
                summary.unresolved.push(name);
                continue;
            };

            let result = self
                .staging
                .read_link_batch(&name)
                .map_err(HarvestError::from)
                .and_then(|batch| match batch {
                    Some(batch) => self.merge_links(category, &batch),
                    None => Ok(MergeReport::default()),
                });

            match result {
                Ok(report) => {
                    summary.reports.insert(name, report);
                }
                Err(e) => {
                    tracing::error!("[{}] Link merge failed, staging kept: {}", name, e);
                    summary.failed.push(name);
                }
            }
        }

        Ok(summary)
    }

    /// Merges every category's staged content
    ///
    /// A failing category is rolled back and reported; the others proceed.
    pub fn merge_all_content(&self) -> Result<MergeSummary, HarvestError> {
        let categories = self.categories_by_name()?;
        let mut summary = MergeSummary::default();

        for name in self.staging.list_content_batches()? {
            let Some(category) = categories.get(&name) else {
                tracing::warn!("Unknown category '{}' in staged content, skipping", name);
                summary.unresolved.push(name);
                continue;
            };

            let result = self
                .staging
                .read_content_batch(&name)
                .map_err(HarvestError::from)
                .and_then(|batch| self.merge_content(category, &batch));

            match result {
                Ok(report) => {
                    summary.reports.insert(name, report);
                }
                Err(e) => {
                    tracing::error!("[{}] Content merge failed, staging kept: {}", name, e);
                    summary.failed.push(name);
                }
            }
        }

        Ok(summary)
    }

    fn categories_by_name(&self) -> Result<HashMap<String, Category>, HarvestError> {
        let categories = lock_storage(&self.storage)?.list_categories()?;
        let mut by_name = HashMap::with_capacity(categories.len());
        for category in categories {
            let name = category.name();
            if let Some(previous) = by_name.insert(name.clone(), category) {
                tracing::warn!(
                    "Categories share the name '{}', category {} is shadowed",
                    name,
                    previous.id
                );
            }
        }
        Ok(by_name)
    }
}

/// Copies merged bodies into the archive; failures are logged only
fn archive_bodies(dir: &Path, artifacts: &[&StagedArtifact]) {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::warn!("Cannot create archive directory {}: {}", dir.display(), e);
        return;
    }

    for artifact in artifacts {
        let target = dir.join(&artifact.manifest.body_file);
        if let Err(e) = std::fs::copy(&artifact.body_path, &target) {
            tracing::warn!(
                "Failed to archive {}: {}",
                artifact.body_path.display(),
                e
            );
        }
    }
}
