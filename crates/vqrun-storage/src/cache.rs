//! Result cache contract.

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use vqrun_models::{AssetDescriptor, ExecutorId, QualityResult};

use crate::error::StorageResult;

/// Address of one cached result: (asset identity, executor identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    asset_identity: String,
    executor_id: ExecutorId,
}

impl CacheKey {
    pub fn new(asset_identity: impl Into<String>, executor_id: ExecutorId) -> Self {
        Self {
            asset_identity: asset_identity.into(),
            executor_id,
        }
    }

    /// Key for an asset measured by the given executor.
    pub fn for_asset(asset: &AssetDescriptor, executor_id: &ExecutorId) -> Self {
        Self::new(asset.identity(), executor_id.clone())
    }

    pub fn asset_identity(&self) -> &str {
        &self.asset_identity
    }

    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }

    /// SHA-256 hex digest of the asset identity, safe for file names.
    pub fn asset_digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.asset_identity.as_bytes()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.executor_id, self.asset_digest())
    }
}

/// Persistent store of quality results.
///
/// Implementations must tolerate concurrent calls for different keys. The
/// executor serializes work per asset identity, so one key is never written
/// by two jobs at once.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Load a result. `None` is authoritative: the caller must compute.
    async fn load(&self, key: &CacheKey) -> StorageResult<Option<QualityResult>>;

    /// Store a result, replacing any previous one under the same key.
    async fn save(&self, key: &CacheKey, result: &QualityResult) -> StorageResult<()>;

    /// Remove a result. Returns whether one was present.
    async fn delete(&self, key: &CacheKey) -> StorageResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vqrun_models::Dimensions;

    #[test]
    fn test_key_ignores_workdir() {
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let dims = Dimensions::new(640, 360);
        let a = AssetDescriptor::new("ref.yuv", "dis.yuv", "/tmp/a", dims, dims);
        let b = AssetDescriptor::new("ref.yuv", "dis.yuv", "/tmp/b", dims, dims);

        assert_eq!(
            CacheKey::for_asset(&a, &executor),
            CacheKey::for_asset(&b, &executor)
        );
    }

    #[test]
    fn test_key_display() {
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let key = CacheKey::new("ref=a|dis=b", executor);
        let display = key.to_string();

        assert!(display.starts_with("PSNR_V1.0/"));
        assert_eq!(display.len(), "PSNR_V1.0/".len() + 64);
    }
}
