//! FFmpeg command builder and process runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use vqrun_models::{Dimensions, PixelFormat};

use crate::error::{MediaError, MediaResult};

/// Number of trailing stderr bytes kept in error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// One `-i` input with the options that precede it.
#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in order, each with its own input arguments
    inputs: Vec<FfmpegInput>,
    /// Output path (`-` for stdout)
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                args: Vec::new(),
                path: input.as_ref().to_path_buf(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
        }
    }

    /// Append another input; later `input_arg` calls apply to it.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            path: input.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an argument before the most recently added input.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.args.push(arg.into());
        }
        self
    }

    /// Describe the current input as headerless planar video.
    pub fn raw_video_input(self, pixel_format: PixelFormat, dims: Dimensions) -> Self {
        self.input_arg("-f")
            .input_arg("rawvideo")
            .input_arg("-pix_fmt")
            .input_arg(pixel_format.as_str())
            .input_arg("-s")
            .input_arg(dims.to_string())
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Drop audio streams.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Pass frames through without duplication or dropping.
    pub fn passthrough_frames(self) -> Self {
        self.output_arg("-vsync").output_arg("0")
    }

    /// Set output pixel format.
    pub fn pixel_format(self, pixel_format: PixelFormat) -> Self {
        self.output_arg("-pix_fmt").output_arg(pixel_format.as_str())
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter graph over multiple inputs.
    pub fn lavfi(self, filter: impl Into<String>) -> Self {
        self.output_arg("-lavfi").output_arg(filter)
    }

    /// Set output container format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Set scaler flags.
    pub fn sws_flags(self, flags: impl Into<String>) -> Self {
        self.output_arg("-sws_flags").output_arg(flags)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        // Overwrite the output, only report errors
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Captured output of an external program.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ToolOutput {
    /// Trailing part of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        let stderr = self.stderr.trim_end();
        if stderr.len() <= STDERR_TAIL_BYTES {
            return stderr.to_string();
        }
        let mut start = stderr.len() - STDERR_TAIL_BYTES;
        while !stderr.is_char_boundary(start) {
            start += 1;
        }
        stderr[start..].to_string()
    }
}

/// Run an external program to completion and capture its output.
///
/// The child is killed if the timeout elapses or the returned future is
/// dropped. A non-zero exit is reported in [`ToolOutput`], not as an error.
pub async fn run_tool(
    program: impl AsRef<Path>,
    args: &[String],
    timeout: Option<Duration>,
) -> MediaResult<ToolOutput> {
    let program = program.as_ref();
    let resolved = which::which(program)
        .map_err(|_| MediaError::ToolNotFound(program.display().to_string()))?;

    debug!("Running: {} {}", program.display(), args.join(" "));

    let child = Command::new(&resolved)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(
                    "{} timed out after {} seconds, killing process",
                    program.display(),
                    limit.as_secs()
                );
                return Err(MediaError::Timeout(limit.as_secs()));
            }
        },
        None => child.wait_with_output().await?,
    };

    Ok(ToolOutput {
        exit_code: output.status.code(),
        success: output.status.success(),
        stdout: output.stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runner for FFmpeg commands.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout for a single invocation
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    /// Create a new runner without a timeout.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run an FFmpeg command, failing on non-zero exit.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_capture(cmd).await.map(|_| ())
    }

    /// Run an FFmpeg command and return its captured output.
    pub async fn run_capture(&self, cmd: &FfmpegCommand) -> MediaResult<ToolOutput> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let output = run_tool("ffmpeg", &args, self.timeout).await?;
        if output.success {
            Ok(output)
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(output.stderr_tail()),
                output.exit_code,
            ))
        }
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}
