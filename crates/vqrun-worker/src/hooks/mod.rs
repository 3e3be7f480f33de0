//! Computation kinds.
//!
//! A kind has a fixed (type, version) identity, writes its measurements to
//! the job's log artifact in `generate`, and reads them back in `parse`. The
//! executor calls each at most once per cache miss, in that order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use vqrun_models::{Dimensions, PixelFormat, QualityResult, Scores};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::log_artifact::LogArtifact;

pub mod command;
pub mod psnr;

pub use command::CommandHook;
pub use psnr::PsnrHook;

/// What the measurement reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeInputs {
    /// Reference workfile, or the source itself on the zero-copy path
    pub ref_path: PathBuf,
    /// Distorted workfile, or the source itself on the zero-copy path
    pub dis_path: PathBuf,
    /// Frame size of both inputs
    pub dims: Dimensions,
    pub pixel_format: PixelFormat,
    /// Inputs are headerless planar frames rather than containers
    pub raw: bool,
    /// Options that do not affect the result
    pub runtime_options: BTreeMap<String, String>,
}

#[async_trait]
pub trait ComputeHook: Send + Sync {
    /// Kind name, e.g. `PSNR`.
    fn type_name(&self) -> &str;

    fn version(&self) -> &str;

    /// Options that change the result. They become part of the executor identity.
    fn options(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Verify the measurement tool can run.
    fn check_available(&self) -> WorkerResult<()> {
        Ok(())
    }

    /// Measure and append the tool's output to `log`.
    async fn generate(&self, inputs: &ComputeInputs, log: &LogArtifact) -> WorkerResult<()>;

    /// Read scores back from `log`.
    async fn parse(&self, log: &LogArtifact) -> WorkerResult<Scores>;

    /// Final shaping of a result, cached or fresh.
    fn post_process(&self, result: QualityResult) -> QualityResult {
        result
    }
}

/// Built-in computation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeKind {
    Psnr,
    Command,
}

impl ComputeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeKind::Psnr => "psnr",
            ComputeKind::Command => "command",
        }
    }
}

impl fmt::Display for ComputeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComputeKind {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "psnr" => Ok(ComputeKind::Psnr),
            "command" | "cmd" => Ok(ComputeKind::Command),
            other => Err(WorkerError::config_error(format!(
                "unknown compute kind '{}'",
                other
            ))),
        }
    }
}

/// Build the configured computation kind.
pub fn build_hook(config: &WorkerConfig) -> WorkerResult<Arc<dyn ComputeHook>> {
    match config.kind {
        ComputeKind::Psnr => {
            let mut hook = PsnrHook::new();
            if let Some(timeout) = config.tool_timeout {
                hook = hook.with_timeout(timeout);
            }
            Ok(Arc::new(hook))
        }
        ComputeKind::Command => {
            let command = config.command.as_deref().ok_or_else(|| {
                WorkerError::config_error("VQRUN_COMMAND is required for the command kind")
            })?;
            let mut hook = CommandHook::parse(command)?;
            if let Some(timeout) = config.tool_timeout {
                hook = hook.with_timeout(timeout);
            }
            Ok(Arc::new(hook))
        }
    }
}

/// Parse `name=value` lines into per-frame series.
///
/// Lines that do not have that shape, or whose value is not a number, are
/// skipped. Values accumulate per name in line order.
pub fn parse_key_values(text: &str) -> Scores {
    let mut scores = Scores::new();
    for line in text.lines() {
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            continue;
        }
        if let Ok(value) = value.trim().parse::<f64>() {
            scores.entry(name.to_string()).or_default().push(value);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!("PSNR".parse::<ComputeKind>().unwrap(), ComputeKind::Psnr);
        assert_eq!("command".parse::<ComputeKind>().unwrap(), ComputeKind::Command);
        assert!("ssim".parse::<ComputeKind>().is_err());
    }

    #[test]
    fn test_parse_key_values() {
        let text = "CMD_1.0\n\nvmaf=91.5\nvmaf=92.25\nnote = not a number\nmotion=3\nbad line\n";
        let scores = parse_key_values(text);

        assert_eq!(scores["vmaf"], vec![91.5, 92.25]);
        assert_eq!(scores["motion"], vec![3.0]);
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_build_hook_requires_command() {
        let config = WorkerConfig {
            kind: ComputeKind::Command,
            command: None,
            ..WorkerConfig::default()
        };
        assert!(build_hook(&config).is_err());

        let config = WorkerConfig {
            kind: ComputeKind::Command,
            command: Some("vmaf {ref} {dis}".to_string()),
            ..WorkerConfig::default()
        };
        assert_eq!(build_hook(&config).unwrap().type_name(), "CMD");
    }
}
