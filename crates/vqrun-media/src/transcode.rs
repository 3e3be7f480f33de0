//! Workfile transcoding.
//!
//! The transcoder turns one source into a raw planar stream at the quality
//! resolution. It is a seam: the executor only depends on [`Transcoder`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use tracing::info;

use vqrun_models::{
    AssetDescriptor, Dimensions, FrameRegion, PixelFormat, ResamplingType, SourceFormat,
};

use crate::command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::filters::transform_filter;
use crate::fs_utils;

/// Histogram of FFmpeg workfile transcode durations.
pub const TRANSCODE_DURATION_SECONDS: &str = "vqrun_transcode_duration_seconds";

/// Everything needed to build one side's workfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub source_dims: Dimensions,
    pub source_format: SourceFormat,
    pub pixel_format: PixelFormat,
    pub crop: Option<FrameRegion>,
    pub pad: Option<FrameRegion>,
    pub target_dims: Dimensions,
    pub resampling: ResamplingType,
}

impl TranscodeJob {
    /// Job producing the reference workfile.
    pub fn reference(asset: &AssetDescriptor) -> Self {
        Self::for_side(
            asset,
            asset.ref_path.clone(),
            asset.ref_workfile_path(),
            asset.ref_dims,
        )
    }

    /// Job producing the distorted workfile.
    pub fn distorted(asset: &AssetDescriptor) -> Self {
        Self::for_side(
            asset,
            asset.dis_path.clone(),
            asset.dis_workfile_path(),
            asset.dis_dims,
        )
    }

    fn for_side(
        asset: &AssetDescriptor,
        source: PathBuf,
        dest: PathBuf,
        source_dims: Dimensions,
    ) -> Self {
        Self {
            source,
            dest,
            source_dims,
            source_format: asset.source_format,
            pixel_format: asset.pixel_format,
            crop: asset.crop,
            pad: asset.pad,
            target_dims: asset.quality_dims(),
            resampling: asset.resampling,
        }
    }
}

/// Produces workfiles from sources.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Write the transformed stream for `job` into `job.dest`.
    ///
    /// `dest` may be a named pipe, in which case this blocks until a reader
    /// drains it.
    async fn transcode(&self, job: &TranscodeJob) -> MediaResult<()>;

    /// Create the named pipe a streamed job writes into.
    async fn create_pipe(&self, dest: &Path) -> MediaResult<()> {
        fs_utils::create_named_pipe(dest)
    }

    /// Verify the transcoder can run at all.
    fn check_available(&self) -> MediaResult<()> {
        Ok(())
    }
}

/// Transcoder backed by the `ffmpeg` CLI.
#[derive(Debug, Clone, Default)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            runner: FfmpegRunner::new(),
        }
    }

    /// Bound each transcode invocation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// Build the FFmpeg command for a job.
    pub fn build_command(job: &TranscodeJob) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(&job.source, &job.dest);

        if job.source_format == SourceFormat::Raw {
            cmd = cmd.raw_video_input(job.pixel_format, job.source_dims);
        }

        cmd.no_audio()
            .passthrough_frames()
            .pixel_format(job.pixel_format)
            .video_filter(transform_filter(
                job.crop.as_ref(),
                job.pad.as_ref(),
                job.target_dims,
            ))
            .format("rawvideo")
            .sws_flags(job.resampling.as_str())
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, job: &TranscodeJob) -> MediaResult<()> {
        let cmd = Self::build_command(job);
        info!(
            source = %job.source.display(),
            dest = %job.dest.display(),
            target = %job.target_dims,
            "Transcoding workfile"
        );

        let start = Instant::now();
        let result = self.runner.run(&cmd).await;
        histogram!(TRANSCODE_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        result
    }

    fn check_available(&self) -> MediaResult<()> {
        check_ffmpeg().map(|_| ())
    }
}
