//! Staged article artifacts
//!
//! Each fetched article is staged as a plain-text body plus a JSON manifest
//! carrying its identity (URL, category, publish timestamp, title) and a
//! checksum of the body. The manifest is written last and is what makes an
//! artifact importable; nothing is ever recovered by parsing file names.

use super::{
    io_error, remove_dir_if_exists, write_atomic, StagingArea, StagingResult,
    STAGING_FORMAT_VERSION,
};
use crate::url::{article_slug, slug_title};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Content extracted from one article, ready to be staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentArtifact {
    pub url: String,
    pub category_id: i64,
    pub publish_timestamp: String,
    pub title: String,
    pub body: String,
    slug: String,
}

impl ContentArtifact {
    pub fn new(
        category_id: i64,
        url: impl Into<String>,
        publish_timestamp: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let url = url.into();
        let slug = article_slug(&url);
        Self {
            title: slug_title(&slug),
            category_id,
            publish_timestamp: publish_timestamp.into(),
            body: body.into(),
            slug,
            url,
        }
    }

    /// File stem shared by the body and the manifest: `<timestamp>-<slug>`
    pub fn stem(&self) -> String {
        format!("{}-{}", self.publish_timestamp, self.slug)
    }
}

/// Versioned record written next to every staged body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: u32,
    pub url: String,
    pub category_id: i64,
    pub publish_timestamp: String,
    pub title: String,
    pub body_file: String,
    pub body_sha256: String,
    pub fetched_at: DateTime<Utc>,
}

/// An artifact read back from staging with a verified body
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub manifest: ArtifactManifest,
    pub body: String,
    pub body_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// A staged file that cannot be imported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything staged for one category
#[derive(Debug, Clone, Default)]
pub struct ContentBatch {
    pub category_name: String,
    /// Importable artifacts, ordered by file stem
    pub artifacts: Vec<StagedArtifact>,
    pub rejected: Vec<RejectedFile>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl StagingArea {
    /// Stages one artifact: body first, then its manifest
    ///
    /// Re-staging the same URL overwrites the previous files.
    pub fn write_artifact(
        &self,
        category_name: &str,
        artifact: &ContentArtifact,
    ) -> StagingResult<PathBuf> {
        let dir = self.content_dir(category_name);
        let stem = artifact.stem();
        let body_file = format!("{}.txt", stem);
        let body_path = dir.join(&body_file);
        let manifest_path = dir.join(format!("{}.json", stem));

        write_atomic(&body_path, artifact.body.as_bytes())?;

        let manifest = ArtifactManifest {
            version: STAGING_FORMAT_VERSION,
            url: artifact.url.clone(),
            category_id: artifact.category_id,
            publish_timestamp: artifact.publish_timestamp.clone(),
            title: artifact.title.clone(),
            body_file,
            body_sha256: sha256_hex(artifact.body.as_bytes()),
            fetched_at: Utc::now(),
        };
        write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;

        Ok(body_path)
    }

    /// URLs that already have a manifest staged for the category
    ///
    /// Unreadable manifests are ignored here; the merge step reports them.
    pub fn staged_artifact_urls(&self, category_name: &str) -> StagingResult<HashSet<String>> {
        let dir = self.content_dir(category_name);
        if !dir.is_dir() {
            return Ok(HashSet::new());
        }

        let mut urls = HashSet::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let manifest = std::fs::read(&path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<ArtifactManifest>(&raw).ok());
            if let Some(manifest) = manifest {
                urls.insert(manifest.url);
            }
        }
        Ok(urls)
    }

    /// Names of every category with a staged content directory
    pub fn list_content_batches(&self) -> StagingResult<Vec<String>> {
        let root = self.content_root();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&root).map_err(io_error(&root))? {
            let path = entry.map_err(io_error(&root))?.path();
            if path.is_dir() {
                names.push(file_name(&path));
            }
        }
        names.sort();
        Ok(names)
    }

    /// Reads and verifies every artifact staged for a category
    ///
    /// Manifests that fail to parse, reference a missing body, carry an
    /// unknown version or a checksum mismatch, and bodies without a manifest,
    /// are returned as rejected instead of failing the batch.
    pub fn read_content_batch(&self, category_name: &str) -> StagingResult<ContentBatch> {
        let dir = self.content_dir(category_name);
        let mut batch = ContentBatch {
            category_name: category_name.to_string(),
            ..ContentBatch::default()
        };
        if !dir.is_dir() {
            return Ok(batch);
        }

        let mut manifests = BTreeMap::new();
        let mut bodies = HashSet::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error(&dir))? {
            let path = entry.map_err(io_error(&dir))?.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => {
                    manifests.insert(file_name(&path), path);
                }
                Some("txt") => {
                    bodies.insert(path);
                }
                _ => {}
            }
        }

        let mut claimed = HashSet::new();
        for (_, manifest_path) in manifests {
            match load_artifact(&dir, &manifest_path) {
                Ok(artifact) => {
                    claimed.insert(artifact.body_path.clone());
                    batch.artifacts.push(artifact);
                }
                Err(reason) => {
                    tracing::warn!("Rejecting staged manifest {}: {}", manifest_path.display(), reason);
                    batch.rejected.push(RejectedFile {
                        path: manifest_path,
                        reason,
                    });
                }
            }
        }

        let mut orphans: Vec<PathBuf> = bodies.difference(&claimed).cloned().collect();
        orphans.sort();
        for path in orphans {
            tracing::warn!("Rejecting staged body without manifest: {}", path.display());
            batch.rejected.push(RejectedFile {
                path,
                reason: "no valid manifest".to_string(),
            });
        }

        Ok(batch)
    }

    /// Moves rejected files out of the way so they are kept for inspection
    pub fn quarantine(&self, category_name: &str, rejected: &[RejectedFile]) -> StagingResult<usize> {
        if rejected.is_empty() {
            return Ok(0);
        }

        let target = self.quarantine_dir(category_name);
        std::fs::create_dir_all(&target).map_err(io_error(&target))?;

        let mut moved = 0;
        for file in rejected {
            if !file.path.exists() {
                continue;
            }
            let destination = free_destination(&target, &file.path);
            std::fs::rename(&file.path, &destination).map_err(io_error(&file.path))?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Deletes a category's staged content directory
    pub fn remove_content_batch(&self, category_name: &str) -> StagingResult<()> {
        remove_dir_if_exists(&self.content_dir(category_name))
    }
}

/// First name in `dir` not already taken: `<name>`, then `<stem>-1.<ext>`, ...
fn free_destination(dir: &Path, source: &Path) -> PathBuf {
    let candidate = dir.join(file_name(source));
    if !candidate.exists() {
        return candidate;
    }

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = source
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{}-{}{}", stem, n, extension)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

fn load_artifact(dir: &Path, manifest_path: &Path) -> Result<StagedArtifact, String> {
    let raw = std::fs::read(manifest_path).map_err(|e| e.to_string())?;
    let manifest: ArtifactManifest =
        serde_json::from_slice(&raw).map_err(|e| format!("malformed manifest: {}", e))?;

    if manifest.version != STAGING_FORMAT_VERSION {
        return Err(format!("unsupported manifest version {}", manifest.version));
    }

    if Path::new(&manifest.body_file).file_name() != Some(OsStr::new(&manifest.body_file)) {
        return Err(format!("body file '{}' is not a plain file name", manifest.body_file));
    }

    let body_path = dir.join(&manifest.body_file);
    let body = std::fs::read_to_string(&body_path)
        .map_err(|e| format!("body {} unreadable: {}", manifest.body_file, e))?;

    if sha256_hex(body.as_bytes()) != manifest.body_sha256 {
        return Err(format!("checksum mismatch for {}", manifest.body_file));
    }

    Ok(StagedArtifact {
        manifest,
        body,
        body_path,
        manifest_path: manifest_path.to_path_buf(),
    })
}
