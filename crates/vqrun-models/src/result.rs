//! Quality results.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ExecutorId;

/// Metric name to per-frame values.
pub type Scores = BTreeMap<String, Vec<f64>>;

/// Result of one computation over one asset.
///
/// Addressed by (asset identity, executor identity); immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityResult {
    /// Canonical identity string of the asset
    pub asset_id: String,
    /// Identity of the executor that produced it
    pub executor_id: ExecutorId,
    /// Metric name to per-frame values
    pub scores: Scores,
}

impl QualityResult {
    pub fn new(asset_id: impl Into<String>, executor_id: ExecutorId, scores: Scores) -> Self {
        Self {
            asset_id: asset_id.into(),
            executor_id,
            scores,
        }
    }

    /// Per-frame values of a metric.
    pub fn frame_scores(&self, metric: &str) -> Option<&[f64]> {
        self.scores.get(metric).map(Vec::as_slice)
    }

    /// Arithmetic mean of a metric over all frames.
    pub fn mean(&self, metric: &str) -> Option<f64> {
        let values = self.frame_scores(metric)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Number of frames, taken from the longest metric series.
    pub fn frame_count(&self) -> usize {
        self.scores.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.scores.keys().map(String::as_str)
    }

    /// True when no metric carries any value.
    pub fn is_empty(&self) -> bool {
        self.scores.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> QualityResult {
        let mut scores = Scores::new();
        scores.insert("psnr_y".to_string(), vec![40.0, 42.0, 44.0]);
        scores.insert("psnr_u".to_string(), vec![45.0]);
        QualityResult::new("asset", ExecutorId::from_string("PSNR_V1.0"), scores)
    }

    #[test]
    fn test_mean_and_frame_count() {
        let r = result();
        assert_eq!(r.mean("psnr_y"), Some(42.0));
        assert_eq!(r.mean("missing"), None);
        assert_eq!(r.frame_count(), 3);
        assert_eq!(r.metric_names().collect::<Vec<_>>(), vec!["psnr_u", "psnr_y"]);
    }

    #[test]
    fn test_empty() {
        let mut scores = Scores::new();
        scores.insert("psnr_y".to_string(), Vec::new());
        let r = QualityResult::new("asset", ExecutorId::from_string("X_V1"), scores);
        assert!(r.is_empty());
        assert!(!result().is_empty());
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(result()).unwrap();
        assert_eq!(json["executor_id"], "PSNR_V1.0");
        assert_eq!(json["scores"]["psnr_y"][1], 42.0);
    }
}
