//! FFmpeg CLI wrapper and workfile management.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a process runner with timeouts
//! - The crop/pad/scale filter chain used to build workfiles
//! - The `Transcoder` seam and its FFmpeg implementation
//! - `WorkfileManager`: streamed (named pipe) or materialized workfiles,
//!   with explicit readiness signalling and source-safe teardown

pub mod command;
pub mod error;
pub mod filters;
pub mod fs_utils;
pub mod transcode;
pub mod workfile;

pub use command::{check_ffmpeg, run_tool, FfmpegCommand, FfmpegRunner, ToolOutput};
pub use error::{MediaError, MediaResult};
pub use filters::transform_filter;
pub use fs_utils::{remove_dir_if_empty, remove_file_if_exists, DirRemoval};
pub use transcode::{FfmpegTranscoder, TranscodeJob, Transcoder};
pub use workfile::{PreparedWorkfiles, WorkfileHandles, WorkfileManager, WorkfileMode, Workfiles};
