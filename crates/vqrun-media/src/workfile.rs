//! Workfile lifecycle.
//!
//! Decides whether a job needs transient workfiles, materializes them
//! (streamed through named pipes or fully written), and tears them down
//! without ever touching the caller's source files.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use vqrun_models::AssetDescriptor;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils;
use crate::transcode::{TranscodeJob, Transcoder};

/// Default bound on the streamed readiness wait (10 attempts x 100ms).
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(1000);

/// How long a failed setup waits for producers to report their own error.
const PRODUCER_SETTLE: Duration = Duration::from_millis(100);

/// How workfiles are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkfileMode {
    /// Named pipe fed by a concurrent producer
    #[default]
    Streamed,
    /// Fully written before the compute step starts
    Materialized,
}

impl WorkfileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkfileMode::Streamed => "streamed",
            WorkfileMode::Materialized => "materialized",
        }
    }
}

impl fmt::Display for WorkfileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkfileMode {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "streamed" | "fifo" => Ok(WorkfileMode::Streamed),
            "materialized" | "file" => Ok(WorkfileMode::Materialized),
            other => Err(MediaError::Unsupported(format!("workfile mode '{}'", other))),
        }
    }
}

/// Transient workfile paths paired with the sources they were made from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkfileHandles {
    ref_path: PathBuf,
    dis_path: PathBuf,
    ref_source: PathBuf,
    dis_source: PathBuf,
}

impl WorkfileHandles {
    /// Derive the handles for an asset, refusing any path equal to its source.
    pub fn for_asset(asset: &AssetDescriptor) -> MediaResult<Self> {
        let handles = Self {
            ref_path: asset.ref_workfile_path(),
            dis_path: asset.dis_workfile_path(),
            ref_source: asset.ref_path.clone(),
            dis_source: asset.dis_path.clone(),
        };

        for (workfile, source) in handles.pairs() {
            if workfile == source {
                return Err(MediaError::UnsafeWorkfile(workfile.to_path_buf()));
            }
        }

        Ok(handles)
    }

    pub fn ref_path(&self) -> &Path {
        &self.ref_path
    }

    pub fn dis_path(&self) -> &Path {
        &self.dis_path
    }

    fn pairs(&self) -> [(&Path, &Path); 2] {
        [
            (&self.ref_path, &self.ref_source),
            (&self.dis_path, &self.dis_source),
        ]
    }
}

/// Paths the compute step reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workfiles {
    /// Zero-copy: the sources themselves
    Source { ref_path: PathBuf, dis_path: PathBuf },
    /// Transformed copies owned by this job
    Transient(WorkfileHandles),
}

impl Workfiles {
    pub fn ref_path(&self) -> &Path {
        match self {
            Workfiles::Source { ref_path, .. } => ref_path,
            Workfiles::Transient(handles) => handles.ref_path(),
        }
    }

    pub fn dis_path(&self) -> &Path {
        match self {
            Workfiles::Source { dis_path, .. } => dis_path,
            Workfiles::Transient(handles) => handles.dis_path(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Workfiles::Transient(_))
    }
}

/// Workfiles ready for the compute step, plus any still-running producers.
///
/// Dropping this aborts producers that were not joined.
pub struct PreparedWorkfiles {
    workfiles: Workfiles,
    producers: JoinSet<MediaResult<()>>,
}

impl fmt::Debug for PreparedWorkfiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedWorkfiles")
            .field("workfiles", &self.workfiles)
            .field("producers", &self.producers.len())
            .finish()
    }
}

impl PreparedWorkfiles {
    fn new(workfiles: Workfiles) -> Self {
        Self {
            workfiles,
            producers: JoinSet::new(),
        }
    }

    pub fn workfiles(&self) -> &Workfiles {
        &self.workfiles
    }

    /// Number of producers not yet joined.
    pub fn pending_producers(&self) -> usize {
        self.producers.len()
    }

    /// Wait for streamed producers to finish, bounded by `grace`.
    ///
    /// Producers still running when `grace` elapses are aborted; the first
    /// failure is returned.
    pub async fn join_producers(&mut self, grace: Duration) -> MediaResult<()> {
        let mut first_error = None;

        loop {
            match tokio::time::timeout(grace, self.producers.join_next()).await {
                Ok(Some(joined)) => {
                    if let Err(e) = flatten_join(joined) {
                        warn!("Workfile producer failed: {}", e);
                        first_error.get_or_insert(e);
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    self.producers.abort_all();
                    first_error.get_or_insert(MediaError::Timeout(grace.as_secs()));
                    break;
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resolves with the first producer failure.
    ///
    /// Never resolves while every producer succeeds or when there are none,
    /// so it can race the compute step. Cancel safe.
    pub async fn producer_failure(&mut self) -> MediaError {
        while let Some(joined) = self.producers.join_next().await {
            if let Err(e) = flatten_join(joined) {
                warn!("Workfile producer failed during compute: {}", e);
                return e;
            }
        }
        std::future::pending().await
    }

    /// Error of the first producer that failed within a short settle period.
    ///
    /// Used to explain a failure seen elsewhere. Producers still running
    /// afterwards are aborted.
    pub async fn finished_producer_error(&mut self) -> Option<MediaError> {
        let mut found = None;
        while let Ok(Some(joined)) =
            tokio::time::timeout(PRODUCER_SETTLE, self.producers.join_next()).await
        {
            if let Err(e) = flatten_join(joined) {
                found.get_or_insert(e);
            }
        }
        self.producers.abort_all();
        found
    }
}

fn flatten_join(joined: Result<MediaResult<()>, JoinError>) -> MediaResult<()> {
    match joined {
        Ok(result) => result,
        Err(join_err) if join_err.is_cancelled() => Ok(()),
        Err(join_err) => Err(MediaError::internal(format!(
            "workfile producer task failed: {}",
            join_err
        ))),
    }
}

/// Prepares and tears down per-job workfiles.
#[derive(Clone)]
pub struct WorkfileManager {
    transcoder: Arc<dyn Transcoder>,
    mode: WorkfileMode,
    ready_timeout: Duration,
}

impl fmt::Debug for WorkfileManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkfileManager")
            .field("mode", &self.mode)
            .field("ready_timeout", &self.ready_timeout)
            .finish()
    }
}

impl WorkfileManager {
    pub fn new(transcoder: Arc<dyn Transcoder>, mode: WorkfileMode) -> Self {
        Self {
            transcoder,
            mode,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// Bound on the streamed readiness wait.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    pub fn mode(&self) -> WorkfileMode {
        self.mode
    }

    /// Verify the transcoder can run.
    pub fn check_available(&self) -> MediaResult<()> {
        self.transcoder.check_available()
    }

    /// Make the inputs for the compute step available.
    ///
    /// Returns the sources untouched when no transform is needed. Otherwise
    /// removes stale workfiles, then produces both sides concurrently.
    pub async fn prepare(&self, asset: &AssetDescriptor) -> MediaResult<PreparedWorkfiles> {
        if asset.uses_source_as_workfile() {
            debug!("Dimensions match and no crop/pad, using sources as workfiles");
            return Ok(PreparedWorkfiles::new(Workfiles::Source {
                ref_path: asset.ref_path.clone(),
                dis_path: asset.dis_path.clone(),
            }));
        }

        let handles = WorkfileHandles::for_asset(asset)?;
        fs_utils::ensure_dir(asset.workdir()).await?;

        // Left over from an interrupted run; mkfifo would fail on them
        self.remove_workfiles(&handles).await?;

        let ref_job = TranscodeJob::reference(asset);
        let dis_job = TranscodeJob::distorted(asset);

        let prepared = match self.mode {
            WorkfileMode::Materialized => self.materialize(handles.clone(), ref_job, dis_job).await,
            WorkfileMode::Streamed => self.stream(handles.clone(), ref_job, dis_job).await,
        };

        if prepared.is_err() {
            if let Err(e) = self.remove_workfiles(&handles).await {
                warn!("Failed to clean up workfiles after setup failure: {}", e);
            }
        }
        prepared
    }

    /// Delete transient workfiles. Sources are never touched.
    pub async fn teardown(&self, workfiles: &Workfiles) -> MediaResult<()> {
        match workfiles {
            Workfiles::Source { .. } => Ok(()),
            Workfiles::Transient(handles) => self.remove_workfiles(handles).await,
        }
    }

    async fn remove_workfiles(&self, handles: &WorkfileHandles) -> MediaResult<()> {
        for (workfile, source) in handles.pairs() {
            if workfile == source {
                return Err(MediaError::UnsafeWorkfile(workfile.to_path_buf()));
            }
            let removed = if fs_utils::is_named_pipe(workfile) {
                fs_utils::release_named_pipe(workfile).await?
            } else {
                fs_utils::remove_file_if_exists(workfile).await?
            };
            if removed {
                debug!("Removed workfile {}", workfile.display());
            }
        }
        Ok(())
    }

    async fn materialize(
        &self,
        handles: WorkfileHandles,
        ref_job: TranscodeJob,
        dis_job: TranscodeJob,
    ) -> MediaResult<PreparedWorkfiles> {
        info!("Materializing reference and distorted workfiles");

        let (ref_result, dis_result) = tokio::join!(
            self.transcoder.transcode(&ref_job),
            self.transcoder.transcode(&dis_job)
        );
        ref_result.and(dis_result)?;

        for path in [handles.ref_path(), handles.dis_path()] {
            if !path.exists() {
                return Err(MediaError::FileNotFound(path.to_path_buf()));
            }
        }

        Ok(PreparedWorkfiles::new(Workfiles::Transient(handles)))
    }

    async fn stream(
        &self,
        handles: WorkfileHandles,
        ref_job: TranscodeJob,
        dis_job: TranscodeJob,
    ) -> MediaResult<PreparedWorkfiles> {
        info!("Streaming reference and distorted workfiles through named pipes");

        let (ref_tx, ref_rx) = oneshot::channel();
        let (dis_tx, dis_rx) = oneshot::channel();

        let mut prepared = PreparedWorkfiles::new(Workfiles::Transient(handles.clone()));
        prepared.producers.spawn(produce_into_pipe(
            Arc::clone(&self.transcoder),
            ref_job,
            ref_tx,
        ));
        prepared.producers.spawn(produce_into_pipe(
            Arc::clone(&self.transcoder),
            dis_job,
            dis_tx,
        ));

        match wait_until_ready(ref_rx, dis_rx, self.ready_timeout, &handles).await {
            Ok(()) => Ok(prepared),
            // Prefer the producer's own error (e.g. mkfifo failed) over the generic one
            Err(e) => match prepared.finished_producer_error().await {
                Some(producer_err) => Err(producer_err),
                None => Err(e),
            },
        }
    }
}

/// Producer task: create the pipe, signal readiness, then stream into it.
///
/// A failed transcode releases its pipe so a reader blocked on it sees
/// end-of-file instead of waiting forever.
async fn produce_into_pipe(
    transcoder: Arc<dyn Transcoder>,
    job: TranscodeJob,
    ready: oneshot::Sender<()>,
) -> MediaResult<()> {
    transcoder.create_pipe(&job.dest).await?;
    // The receiver is gone only if setup already failed
    let _ = ready.send(());

    let result = transcoder.transcode(&job).await;
    if result.is_err() {
        if let Err(e) = fs_utils::release_named_pipe(&job.dest).await {
            warn!("Failed to release pipe {}: {}", job.dest.display(), e);
        }
    }
    result
}

/// Wait for both readiness signals, bounded by `timeout`.
pub(crate) async fn wait_until_ready(
    ref_ready: oneshot::Receiver<()>,
    dis_ready: oneshot::Receiver<()>,
    timeout: Duration,
    handles: &WorkfileHandles,
) -> MediaResult<()> {
    match tokio::time::timeout(timeout, async { tokio::try_join!(ref_ready, dis_ready) }).await {
        Ok(Ok(_)) => {
            debug!("Both workfiles ready");
            Ok(())
        }
        Ok(Err(_)) => Err(MediaError::internal(
            "workfile producer exited before signalling readiness",
        )),
        Err(_) => Err(wait_until_ready_error(handles, timeout)),
    }
}

fn wait_until_ready_error(handles: &WorkfileHandles, timeout: Duration) -> MediaError {
    MediaError::WorkfileTimeout {
        ref_path: handles.ref_path().to_path_buf(),
        dis_path: handles.dis_path().to_path_buf(),
        waited_ms: timeout.as_millis() as u64,
    }
}
