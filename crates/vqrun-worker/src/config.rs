//! Worker configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vqrun_media::WorkfileMode;

use crate::error::{WorkerError, WorkerResult};
use crate::hooks::ComputeKind;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How transient workfiles are produced
    pub workfile_mode: WorkfileMode,
    /// Delete workfiles, the log artifact and an emptied workdir after each job
    pub delete_workdir: bool,
    /// Run batch jobs concurrently
    pub parallelize: bool,
    /// Maximum concurrent jobs when parallel
    pub max_parallel: usize,
    /// Readiness wait for streamed workfiles is `ready_attempts * ready_interval`
    pub ready_attempts: u32,
    pub ready_interval: Duration,
    /// How long streamed producers may keep running after the compute step
    pub producer_grace: Duration,
    /// Bound on each external tool invocation
    pub tool_timeout: Option<Duration>,
    /// Root of the filesystem result store; results are not cached when unset
    pub result_store_dir: Option<PathBuf>,
    /// Prometheus exporter listen address
    pub metrics_addr: Option<SocketAddr>,
    /// Computation kind
    pub kind: ComputeKind,
    /// Command line for the command kind
    pub command: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workfile_mode: WorkfileMode::Streamed,
            delete_workdir: true,
            parallelize: false,
            max_parallel: default_parallelism(),
            ready_attempts: 10,
            ready_interval: Duration::from_millis(100),
            producer_grace: Duration::from_secs(30),
            tool_timeout: None,
            result_store_dir: None,
            metrics_addr: None,
            kind: ComputeKind::Psnr,
            command: None,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from any key lookup.
    ///
    /// Unparseable numbers fall back to their defaults. An unknown workfile
    /// mode, compute kind or listen address is a configuration error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> WorkerResult<Self> {
        let defaults = Self::default();

        let workfile_mode = match lookup("VQRUN_WORKFILE_MODE") {
            Some(v) => v
                .parse::<WorkfileMode>()
                .map_err(|e| WorkerError::config_error(e.to_string()))?,
            None => defaults.workfile_mode,
        };

        let kind = match lookup("VQRUN_KIND") {
            Some(v) => v.parse::<ComputeKind>()?,
            None => defaults.kind,
        };

        let metrics_addr = match lookup("VQRUN_METRICS_ADDR").filter(|v| !v.is_empty()) {
            Some(v) => Some(v.parse::<SocketAddr>().map_err(|e| {
                WorkerError::config_error(format!("VQRUN_METRICS_ADDR '{}': {}", v, e))
            })?),
            None => None,
        };

        let ready_interval = Duration::from_millis(
            parse_or(&lookup, "VQRUN_READY_INTERVAL_MS")
                .unwrap_or(defaults.ready_interval.as_millis() as u64),
        );

        Ok(Self {
            workfile_mode,
            delete_workdir: lookup("VQRUN_DELETE_WORKDIR")
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.delete_workdir),
            parallelize: lookup("VQRUN_PARALLELIZE")
                .and_then(|s| parse_bool(&s))
                .unwrap_or(defaults.parallelize),
            max_parallel: parse_or(&lookup, "VQRUN_MAX_PARALLEL")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_parallel),
            ready_attempts: parse_or(&lookup, "VQRUN_READY_ATTEMPTS")
                .unwrap_or(defaults.ready_attempts),
            ready_interval,
            producer_grace: parse_or(&lookup, "VQRUN_PRODUCER_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.producer_grace),
            tool_timeout: parse_or(&lookup, "VQRUN_TOOL_TIMEOUT_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs),
            result_store_dir: lookup("VQRUN_RESULT_STORE_DIR")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            metrics_addr,
            kind,
            command: lookup("VQRUN_COMMAND").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Bound on the streamed readiness wait.
    ///
    /// Falls back to the default bound when the product overflows.
    pub fn ready_timeout(&self) -> Duration {
        self.ready_interval
            .checked_mul(self.ready_attempts)
            .unwrap_or(vqrun_media::workfile::DEFAULT_READY_TIMEOUT)
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> WorkerResult<WorkerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.workfile_mode, WorkfileMode::Streamed);
        assert!(config.delete_workdir);
        assert!(!config.parallelize);
        assert!(config.max_parallel >= 1);
        assert_eq!(config.ready_timeout(), Duration::from_secs(1));
        assert!(config.result_store_dir.is_none());
        assert_eq!(config.kind, ComputeKind::Psnr);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("VQRUN_WORKFILE_MODE", "materialized"),
            ("VQRUN_DELETE_WORKDIR", "false"),
            ("VQRUN_PARALLELIZE", "1"),
            ("VQRUN_MAX_PARALLEL", "3"),
            ("VQRUN_READY_ATTEMPTS", "20"),
            ("VQRUN_READY_INTERVAL_MS", "50"),
            ("VQRUN_TOOL_TIMEOUT_SECS", "600"),
            ("VQRUN_RESULT_STORE_DIR", "/var/cache/vqrun"),
            ("VQRUN_METRICS_ADDR", "127.0.0.1:9100"),
            ("VQRUN_KIND", "command"),
            ("VQRUN_COMMAND", "vmaf -r {ref} -d {dis}"),
        ])
        .unwrap();

        assert_eq!(config.workfile_mode, WorkfileMode::Materialized);
        assert!(!config.delete_workdir);
        assert!(config.parallelize);
        assert_eq!(config.max_parallel, 3);
        assert_eq!(config.ready_timeout(), Duration::from_secs(1));
        assert_eq!(config.tool_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.result_store_dir, Some(PathBuf::from("/var/cache/vqrun")));
        assert_eq!(config.metrics_addr.unwrap().port(), 9100);
        assert_eq!(config.kind, ComputeKind::Command);
        assert_eq!(config.command.as_deref(), Some("vmaf -r {ref} -d {dis}"));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = config(&[("VQRUN_MAX_PARALLEL", "0"), ("VQRUN_READY_ATTEMPTS", "many")]).unwrap();
        assert!(config.max_parallel >= 1);
        assert_eq!(config.ready_attempts, 10);
    }

    #[test]
    fn test_huge_readiness_values_do_not_overflow() {
        let config = config(&[
            ("VQRUN_READY_ATTEMPTS", "4294967295"),
            ("VQRUN_READY_INTERVAL_MS", "18446744073709551615"),
        ])
        .unwrap();
        assert_eq!(config.ready_attempts, u32::MAX);
        assert_eq!(config.ready_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_bad_enums_are_errors() {
        assert!(config(&[("VQRUN_WORKFILE_MODE", "tape")]).unwrap_err().is_configuration());
        assert!(config(&[("VQRUN_KIND", "ssim")]).unwrap_err().is_configuration());
        assert!(config(&[("VQRUN_METRICS_ADDR", "nowhere")]).is_err());
    }
}
