//! Batch input and output documents for the worker binary.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vqrun_models::{AssetDescriptor, ExecutorId, QualityResult};

use crate::error::{WorkerError, WorkerResult};

/// Assets to measure plus options that do not affect results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub assets: Vec<AssetDescriptor>,
    #[serde(default)]
    pub runtime_options: BTreeMap<String, String>,
}

impl RunManifest {
    pub async fn from_path(path: impl AsRef<Path>) -> WorkerResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        serde_json::from_slice(&data).map_err(|e| {
            WorkerError::config_error(format!("invalid manifest {}: {}", path.display(), e))
        })
    }
}

/// Outcome of one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetOutcome {
    pub asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QualityResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub executor_id: ExecutorId,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<AssetOutcome>,
}

impl RunReport {
    pub fn new(
        executor_id: ExecutorId,
        assets: &[AssetDescriptor],
        outcomes: Vec<WorkerResult<QualityResult>>,
    ) -> Self {
        let outcomes = assets
            .iter()
            .zip(outcomes)
            .map(|(asset, outcome)| match outcome {
                Ok(result) => AssetOutcome {
                    asset: asset.identity(),
                    result: Some(result),
                    error: None,
                },
                Err(e) => AssetOutcome {
                    asset: asset.identity(),
                    result: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        Self {
            executor_id,
            finished_at: Utc::now(),
            outcomes,
        }
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use vqrun_models::{Dimensions, Scores};

    #[tokio::test]
    async fn test_manifest_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(
            &path,
            r#"{
                "assets": [{
                    "ref_path": "/data/ref.yuv",
                    "dis_path": "/data/dis.yuv",
                    "workdir": "/tmp/work",
                    "ref_dims": {"width": 1920, "height": 1080},
                    "dis_dims": {"width": 1280, "height": 720},
                    "quality_dims": {"width": 1280, "height": 720}
                }],
                "runtime_options": {"threads": "4"}
            }"#,
        )
        .unwrap();

        let manifest = RunManifest::from_path(&path).await.unwrap();
        assert_eq!(manifest.assets.len(), 1);
        assert_eq!(manifest.assets[0].quality_dims(), Dimensions::new(1280, 720));
        assert_eq!(manifest.runtime_options["threads"], "4");
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, "[]").unwrap();

        assert!(RunManifest::from_path(&path).await.unwrap_err().is_configuration());
    }

    #[test]
    fn test_report_keeps_order() {
        let dims = Dimensions::new(64, 64);
        let assets = vec![
            AssetDescriptor::new("a.yuv", "b.yuv", "/tmp", dims, dims),
            AssetDescriptor::new("c.yuv", "d.yuv", "/tmp", dims, dims),
        ];
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let ok = QualityResult::new(assets[0].identity(), executor.clone(), Scores::new());

        let report = RunReport::new(
            executor,
            &assets,
            vec![Ok(ok), Err(WorkerError::PathNotFound("c.yuv".into()))],
        );

        assert_eq!(report.failed(), 1);
        assert!(report.outcomes[0].result.is_some());
        assert!(report.outcomes[1].error.as_deref().unwrap().contains("c.yuv"));
    }
}
