//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for per-asset jobs with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use vqrun_models::{AssetDescriptor, ExecutorId};

/// Length of the identity digest prefix shown in log lines.
const SHORT_HASH_LEN: usize = 12;

/// Job logger for structured logging with consistent formatting.
///
/// Every event carries the asset (short identity digest) and the executor
/// identity.
#[derive(Debug, Clone)]
pub struct JobLogger {
    asset: String,
    executor: String,
}

impl JobLogger {
    /// Create a logger for one asset measured by one executor.
    pub fn new(asset: &AssetDescriptor, executor_id: &ExecutorId) -> Self {
        let mut asset_hash = asset.identity_hash();
        asset_hash.truncate(SHORT_HASH_LEN);

        Self {
            asset: asset_hash,
            executor: executor_id.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            asset = %self.asset,
            executor = %self.executor,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            asset = %self.asset,
            executor = %self.executor,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            asset = %self.asset,
            executor = %self.executor,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            asset = %self.asset,
            executor = %self.executor,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            asset = %self.asset,
            executor = %self.executor,
            "Job completed: {}", message
        );
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            asset = %self.asset,
            executor = %self.executor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vqrun_models::Dimensions;

    #[test]
    fn test_job_logger_creation() {
        let dims = Dimensions::new(1920, 1080);
        let asset = AssetDescriptor::new("ref.yuv", "dis.yuv", "/tmp/w", dims, dims);
        let executor = ExecutorId::new("PSNR", "1.0", &BTreeMap::new());
        let logger = JobLogger::new(&asset, &executor);

        assert_eq!(logger.asset().len(), SHORT_HASH_LEN);
        assert!(asset.identity_hash().starts_with(logger.asset()));
        assert_eq!(logger.executor(), "PSNR_V1.0");
    }
}
