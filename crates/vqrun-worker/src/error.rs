//! Worker error types.

use std::path::PathBuf;

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("{tool} failed: {message}")]
    ExternalToolFailure { tool: String, message: String },

    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Asset error: {0}")]
    Asset(#[from] vqrun_models::AssetError),

    #[error("Media error: {0}")]
    Media(#[from] vqrun_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] vqrun_storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn external_tool(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExternalToolFailure {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Map a media failure from a measurement tool into the worker's terms.
    ///
    /// Tool exits and timeouts become [`WorkerError::ExternalToolFailure`];
    /// everything else stays a media error.
    pub fn from_tool(tool: &str, err: vqrun_media::MediaError) -> Self {
        use vqrun_media::MediaError;

        match err {
            MediaError::FfmpegFailed {
                message, stderr, ..
            } => {
                let detail = match stderr {
                    Some(stderr) if !stderr.is_empty() => format!("{}: {}", message, stderr),
                    _ => message,
                };
                Self::external_tool(tool, detail)
            }
            MediaError::Timeout(secs) => {
                Self::external_tool(tool, format!("timed out after {} seconds", secs))
            }
            other => Self::Media(other),
        }
    }

    /// Invalid setup that should abort a batch before any job starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, WorkerError::ConfigError(_) | WorkerError::Asset(_))
    }

    /// Short label for metrics.
    pub fn category(&self) -> &'static str {
        if self.is_external_tool_failure() {
            return "external_tool";
        }
        match self {
            WorkerError::ConfigError(_) | WorkerError::Asset(_) => "configuration",
            WorkerError::PathNotFound(_) => "path_not_found",
            WorkerError::ExternalToolFailure { .. } => "external_tool",
            WorkerError::JobFailed(_) => "job",
            WorkerError::Media(_) => "media",
            WorkerError::Storage(_) => "storage",
            WorkerError::Io(_) => "io",
        }
    }

    /// Failure of an external program (measurement tool or transcoder).
    pub fn is_external_tool_failure(&self) -> bool {
        match self {
            WorkerError::ExternalToolFailure { .. } => true,
            WorkerError::Media(e) => e.is_tool_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vqrun_media::MediaError;

    #[test]
    fn test_tool_failure_mapping() {
        let err = WorkerError::from_tool(
            "ffmpeg",
            MediaError::ffmpeg_failed("exit 1", Some("bad input".to_string()), Some(1)),
        );
        assert!(matches!(err, WorkerError::ExternalToolFailure { .. }));
        assert_eq!(err.to_string(), "ffmpeg failed: exit 1: bad input");

        let err = WorkerError::from_tool("vmaf", MediaError::Timeout(30));
        assert!(err.is_external_tool_failure());

        let err = WorkerError::from_tool("vmaf", MediaError::FileNotFound("x".into()));
        assert!(matches!(err, WorkerError::Media(_)));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(WorkerError::config_error("no ffmpeg").is_configuration());
        assert!(WorkerError::Asset(vqrun_models::AssetError::configuration("crop")).is_configuration());
        assert!(!WorkerError::PathNotFound("ref.yuv".into()).is_configuration());
    }

    #[test]
    fn test_category_labels_tool_failures() {
        let ffmpeg = WorkerError::Media(MediaError::ffmpeg_failed("exit 1", None, Some(1)));
        assert_eq!(ffmpeg.category(), "external_tool");
        assert_eq!(WorkerError::Media(MediaError::Timeout(5)).category(), "external_tool");
        assert_eq!(WorkerError::Media(MediaError::internal("x")).category(), "media");
        assert_eq!(WorkerError::PathNotFound("ref.yuv".into()).category(), "path_not_found");
    }
}
