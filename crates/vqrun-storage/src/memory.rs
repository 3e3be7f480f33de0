//! In-memory result store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use vqrun_models::QualityResult;

use crate::cache::{CacheKey, ResultCache};
use crate::error::StorageResult;

/// Result cache held in process memory. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResultStore {
    results: Arc<RwLock<HashMap<CacheKey, QualityResult>>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for InMemoryResultStore {
    async fn load(&self, key: &CacheKey) -> StorageResult<Option<QualityResult>> {
        Ok(self.results.read().await.get(key).cloned())
    }

    async fn save(&self, key: &CacheKey, result: &QualityResult) -> StorageResult<()> {
        self.results
            .write()
            .await
            .insert(key.clone(), result.clone());
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> StorageResult<bool> {
        Ok(self.results.write().await.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vqrun_models::{ExecutorId, Scores};

    #[tokio::test]
    async fn test_clones_share_entries() {
        let store = InMemoryResultStore::new();
        let shared = store.clone();
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let key = CacheKey::new("ref=a|dis=b", executor.clone());
        let result = QualityResult::new("ref=a|dis=b", executor, Scores::new());

        tokio_test::assert_ok!(store.save(&key, &result).await);
        assert_eq!(shared.load(&key).await.unwrap(), Some(result));
        assert_eq!(shared.len().await, 1);

        assert!(shared.delete(&key).await.unwrap());
        assert!(store.is_empty().await);
    }
}
