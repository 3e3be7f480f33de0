//! Quality executor.
//!
//! This crate provides:
//! - The per-asset executor (cache check, workfiles, compute, teardown)
//! - Batch runner with per-identity locking
//! - Computation kinds (FFmpeg PSNR, arbitrary command)
//! - Log artifact handling
//! - Configuration, structured job logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod lock_table;
pub mod log_artifact;
pub mod logging;
pub mod manifest;
pub mod metrics;
pub mod runner;
pub mod workdir_table;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{Executor, ExecutorBuilder};
pub use hooks::{build_hook, CommandHook, ComputeHook, ComputeInputs, ComputeKind, PsnrHook};
pub use lock_table::{IdentityGuard, LockTable};
pub use log_artifact::LogArtifact;
pub use logging::JobLogger;
pub use manifest::{AssetOutcome, RunManifest, RunReport};
pub use runner::ParallelRunner;
pub use workdir_table::{WorkdirLease, WorkdirTable};
