//! Filesystem result store.
//!
//! One JSON document per result at `{root}/{executor_id}/{asset_digest}.json`.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never observes a half-written document.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use vqrun_models::QualityResult;

use crate::cache::{CacheKey, ResultCache};
use crate::error::{StorageError, StorageResult};

/// On-disk envelope around a result.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResult {
    /// Full identity, checked on load to rule out digest collisions
    asset_identity: String,
    stored_at: DateTime<Utc>,
    result: QualityResult,
}

/// Result cache backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FileSystemResultStore {
    root: PathBuf,
}

impl FileSystemResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document path for a key.
    pub fn document_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(sanitize_component(key.executor_id().as_str()))
            .join(format!("{}.json", key.asset_digest()))
    }
}

/// Keep an executor identity usable as one path component.
fn sanitize_component(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}

#[async_trait]
impl ResultCache for FileSystemResultStore {
    async fn load(&self, key: &CacheKey) -> StorageResult<Option<QualityResult>> {
        let path = self.document_path(key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = %key, "Result cache miss");
                return Ok(None);
            }
            Err(e) => return Err(StorageError::from(e)),
        };

        match serde_json::from_slice::<StoredResult>(&data) {
            Ok(stored) if stored.asset_identity == key.asset_identity() => {
                debug!(key = %key, stored_at = %stored.stored_at, "Result cache hit");
                Ok(Some(stored.result))
            }
            Ok(_) => {
                warn!(key = %key, "Cached result belongs to another asset, treating as miss");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cached result, treating as miss");
                Ok(None)
            }
        }
    }

    async fn save(&self, key: &CacheKey, result: &QualityResult) -> StorageResult<()> {
        let path = self.document_path(key);
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::write_failed(&path, "document path has no parent"))?;
        fs::create_dir_all(parent).await?;

        let stored = StoredResult {
            asset_identity: key.asset_identity().to_string(),
            stored_at: Utc::now(),
            result: result.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored)?;

        let tmp = path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, &json).await {
            return Err(StorageError::write_failed(&tmp, e.to_string()));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::write_failed(&path, e.to_string()));
        }

        debug!(key = %key, path = %path.display(), "Stored result");
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> StorageResult<bool> {
        let path = self.document_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Deleted cached result");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::delete_failed(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }
}
