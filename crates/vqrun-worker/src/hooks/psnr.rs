//! PSNR through FFmpeg's `psnr` filter.

use std::time::Duration;

use async_trait::async_trait;

use vqrun_media::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use vqrun_models::Scores;

use super::{ComputeHook, ComputeInputs};
use crate::error::{WorkerError, WorkerResult};
use crate::log_artifact::LogArtifact;

/// Value reported for identical frames (FFmpeg prints `inf`).
pub const PSNR_MAX_DB: f64 = 60.0;

const METRICS: [&str; 4] = ["psnr_y", "psnr_u", "psnr_v", "psnr_avg"];

#[derive(Debug, Clone, Default)]
pub struct PsnrHook {
    runner: FfmpegRunner,
}

impl PsnrHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// FFmpeg invocation printing per-frame stats to stdout.
    pub fn build_command(inputs: &ComputeInputs) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&inputs.ref_path, "-");
        if inputs.raw {
            cmd = cmd.raw_video_input(inputs.pixel_format, inputs.dims);
        }
        cmd = cmd.add_input(&inputs.dis_path);
        if inputs.raw {
            cmd = cmd.raw_video_input(inputs.pixel_format, inputs.dims);
        }
        cmd.lavfi("[1:v][0:v]psnr=stats_file=-").format("null")
    }
}

#[async_trait]
impl ComputeHook for PsnrHook {
    fn type_name(&self) -> &str {
        "PSNR"
    }

    fn version(&self) -> &str {
        "1.0"
    }

    fn check_available(&self) -> WorkerResult<()> {
        check_ffmpeg()
            .map(|_| ())
            .map_err(|e| WorkerError::config_error(e.to_string()))
    }

    async fn generate(&self, inputs: &ComputeInputs, log: &LogArtifact) -> WorkerResult<()> {
        let cmd = Self::build_command(inputs);
        let output = self
            .runner
            .run_capture(&cmd)
            .await
            .map_err(|e| WorkerError::from_tool("ffmpeg", e))?;
        log.append(&output.stdout).await
    }

    async fn parse(&self, log: &LogArtifact) -> WorkerResult<Scores> {
        Ok(parse_psnr_stats(&log.read_to_string().await?))
    }
}

/// Parse psnr filter stats lines (`n:1 mse_avg:.. psnr_avg:.. psnr_y:..`).
pub fn parse_psnr_stats(text: &str) -> Scores {
    let mut scores = Scores::new();
    for line in text.lines().filter(|l| l.starts_with("n:")) {
        for field in line.split_whitespace() {
            let Some((name, value)) = field.split_once(':') else {
                continue;
            };
            if !METRICS.contains(&name) {
                continue;
            }
            let value = match value {
                "inf" => PSNR_MAX_DB,
                v => match v.parse::<f64>() {
                    Ok(v) => v.min(PSNR_MAX_DB),
                    Err(_) => continue,
                },
            };
            scores.entry(name.to_string()).or_default().push(value);
        }
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vqrun_models::{Dimensions, PixelFormat};

    fn inputs(raw: bool) -> ComputeInputs {
        ComputeInputs {
            ref_path: "/w/ref.yuv".into(),
            dis_path: "/w/dis.yuv".into(),
            dims: Dimensions::new(1280, 720),
            pixel_format: PixelFormat::Yuv420p,
            raw,
            runtime_options: BTreeMap::new(),
        }
    }

    #[test]
    fn test_parse_stats() {
        let stats = "PSNR_1.0\n\n\
            n:1 mse_avg:2.50 mse_y:3.00 mse_u:1.00 mse_v:1.50 psnr_avg:44.15 psnr_y:43.36 psnr_u:48.13 psnr_v:46.37\n\
            n:2 mse_avg:0.00 mse_y:0.00 mse_u:0.00 mse_v:0.00 psnr_avg:inf psnr_y:inf psnr_u:inf psnr_v:inf\n";
        let scores = parse_psnr_stats(stats);

        assert_eq!(scores.len(), 4);
        assert_eq!(scores["psnr_y"], vec![43.36, PSNR_MAX_DB]);
        assert_eq!(scores["psnr_avg"], vec![44.15, PSNR_MAX_DB]);
        assert!(!scores.contains_key("mse_y"));
    }

    #[test]
    fn test_parse_empty_log() {
        assert!(parse_psnr_stats("PSNR_1.0\n\n").is_empty());
    }

    #[test]
    fn test_command_for_raw_inputs() {
        let args = PsnrHook::build_command(&inputs(true)).build_args();
        let joined = args.join(" ");

        assert!(joined.contains("-s 1280x720 -i /w/ref.yuv"));
        assert!(joined.contains("-s 1280x720 -i /w/dis.yuv"));
        assert!(joined.contains("-lavfi [1:v][0:v]psnr=stats_file=- -f null -"));
    }

    #[test]
    fn test_command_for_container_inputs() {
        let args = PsnrHook::build_command(&inputs(false)).build_args();
        assert!(!args.contains(&"rawvideo".to_string()));
    }

    #[test]
    fn test_identity() {
        let hook = PsnrHook::new();
        assert_eq!(hook.type_name(), "PSNR");
        assert_eq!(hook.version(), "1.0");
        assert!(hook.options().is_empty());
    }
}
