//! Quality executor.
//!
//! Runs one computation kind over assets. Per asset:
//! cache check, source validation, workfile setup, log preparation, compute,
//! workfile teardown, result extraction, cache save, log teardown.
//! A cache hit skips everything after the check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use vqrun_media::{
    FfmpegTranscoder, MediaError, PreparedWorkfiles, Transcoder, WorkfileManager, WorkfileMode,
};
use vqrun_models::{AssetDescriptor, ExecutorId, QualityResult, SourceFormat};
use vqrun_storage::{CacheKey, FileSystemResultStore, ResultCache};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::hooks::{ComputeHook, ComputeInputs};
use crate::log_artifact::LogArtifact;
use crate::logging::JobLogger;
use crate::metrics;
use crate::runner::ParallelRunner;
use crate::workdir_table::WorkdirTable;

/// Default time streamed producers may keep running after the compute step.
pub const DEFAULT_PRODUCER_GRACE: Duration = Duration::from_secs(30);

/// Runs a computation kind over assets with caching and workfile management.
///
/// Cheap to clone; clones share the hook, transcoder and cache.
#[derive(Clone)]
pub struct Executor {
    hook: Arc<dyn ComputeHook>,
    executor_id: ExecutorId,
    workfiles: WorkfileManager,
    cache: Option<Arc<dyn ResultCache>>,
    runner: ParallelRunner,
    runtime_options: Arc<BTreeMap<String, String>>,
    delete_workdir: bool,
    producer_grace: Duration,
    workdirs: WorkdirTable,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("executor_id", &self.executor_id)
            .field("workfiles", &self.workfiles)
            .field("cached", &self.cache.is_some())
            .field("runner", &self.runner)
            .field("delete_workdir", &self.delete_workdir)
            .finish()
    }
}

/// Builder for [`Executor`].
pub struct ExecutorBuilder {
    hook: Arc<dyn ComputeHook>,
    transcoder: Arc<dyn Transcoder>,
    workfile_mode: WorkfileMode,
    ready_timeout: Option<Duration>,
    cache: Option<Arc<dyn ResultCache>>,
    runner: ParallelRunner,
    runtime_options: BTreeMap<String, String>,
    delete_workdir: bool,
    producer_grace: Duration,
}

impl ExecutorBuilder {
    pub fn transcoder(mut self, transcoder: Arc<dyn Transcoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn workfile_mode(mut self, mode: WorkfileMode) -> Self {
        self.workfile_mode = mode;
        self
    }

    /// Bound on the streamed readiness wait.
    pub fn ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn runner(mut self, runner: ParallelRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Options handed to the computation that never enter the executor identity.
    pub fn runtime_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_options.insert(key.into(), value.into());
        self
    }

    /// Remove workfiles, the log and an emptied workdir after each job.
    pub fn delete_workdir(mut self, delete: bool) -> Self {
        self.delete_workdir = delete;
        self
    }

    pub fn producer_grace(mut self, grace: Duration) -> Self {
        self.producer_grace = grace;
        self
    }

    pub fn build(self) -> Executor {
        let executor_id = ExecutorId::new(
            self.hook.type_name(),
            self.hook.version(),
            &self.hook.options(),
        );

        let mut workfiles = WorkfileManager::new(self.transcoder, self.workfile_mode);
        if let Some(timeout) = self.ready_timeout {
            workfiles = workfiles.with_ready_timeout(timeout);
        }

        Executor {
            hook: self.hook,
            executor_id,
            workfiles,
            cache: self.cache,
            runner: self.runner,
            runtime_options: Arc::new(self.runtime_options),
            delete_workdir: self.delete_workdir,
            producer_grace: self.producer_grace,
            workdirs: WorkdirTable::new(),
        }
    }
}

impl Executor {
    pub fn builder(hook: Arc<dyn ComputeHook>) -> ExecutorBuilder {
        ExecutorBuilder {
            hook,
            transcoder: Arc::new(FfmpegTranscoder::new()),
            workfile_mode: WorkfileMode::default(),
            ready_timeout: None,
            cache: None,
            runner: ParallelRunner::default(),
            runtime_options: BTreeMap::new(),
            delete_workdir: true,
            producer_grace: DEFAULT_PRODUCER_GRACE,
        }
    }

    /// Executor wired from configuration, using FFmpeg for workfiles and the
    /// filesystem store when a store directory is configured.
    pub fn from_config(config: &WorkerConfig, hook: Arc<dyn ComputeHook>) -> Self {
        let mut transcoder = FfmpegTranscoder::new();
        if let Some(timeout) = config.tool_timeout {
            transcoder = transcoder.with_timeout(timeout);
        }

        let runner = if config.parallelize {
            ParallelRunner::parallel(config.max_parallel)
        } else {
            ParallelRunner::sequential()
        };

        let mut builder = Self::builder(hook)
            .transcoder(Arc::new(transcoder))
            .workfile_mode(config.workfile_mode)
            .ready_timeout(config.ready_timeout())
            .runner(runner)
            .delete_workdir(config.delete_workdir)
            .producer_grace(config.producer_grace);

        if let Some(dir) = &config.result_store_dir {
            builder = builder.cache(Arc::new(FileSystemResultStore::new(dir)));
        }

        builder.build()
    }

    pub fn executor_id(&self) -> &ExecutorId {
        &self.executor_id
    }

    /// Add options that never enter the executor identity.
    pub fn with_runtime_options(mut self, options: BTreeMap<String, String>) -> Self {
        if !options.is_empty() {
            let mut merged = (*self.runtime_options).clone();
            merged.extend(options);
            self.runtime_options = Arc::new(merged);
        }
        self
    }

    /// Check every asset and the tools before any job starts.
    ///
    /// The transcoder is only required when some asset needs workfiles.
    pub fn validate(&self, assets: &[AssetDescriptor]) -> WorkerResult<()> {
        for asset in assets {
            asset.validate()?;
        }

        if assets.iter().any(|a| !a.uses_source_as_workfile()) {
            self.workfiles.check_available().map_err(|e| {
                WorkerError::config_error(format!("transcoder is not available: {}", e))
            })?;
        }

        if !assets.is_empty() {
            self.hook.check_available()?;
        }

        Ok(())
    }

    /// Run every asset and return one outcome per asset, in input order.
    ///
    /// Only configuration problems fail the whole call; a failing asset is
    /// reported in its slot and its siblings still run.
    pub async fn run(
        &self,
        assets: Vec<AssetDescriptor>,
    ) -> WorkerResult<Vec<WorkerResult<QualityResult>>> {
        self.validate(&assets)?;

        let executor = self.clone();
        let outcomes = self
            .runner
            .run_all(assets, move |asset| {
                let executor = executor.clone();
                async move { executor.run_one(&asset).await }
            })
            .await;

        Ok(outcomes)
    }

    /// Produce the result for one asset, from the cache when present.
    pub async fn run_one(&self, asset: &AssetDescriptor) -> WorkerResult<QualityResult> {
        let logger = JobLogger::new(asset, &self.executor_id);
        let span = logger.create_span();

        match self.execute(asset, &logger).instrument(span).await {
            Ok(result) => Ok(self.hook.post_process(result)),
            Err(e) => {
                metrics::record_asset_failed(self.executor_id.as_str(), e.category());
                logger.log_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Delete the cached result of every asset for this executor.
    ///
    /// Returns how many results were removed.
    pub async fn remove_results(&self, assets: &[AssetDescriptor]) -> WorkerResult<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };

        let mut removed = 0;
        for asset in assets {
            if cache
                .delete(&CacheKey::for_asset(asset, &self.executor_id))
                .await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn execute(
        &self,
        asset: &AssetDescriptor,
        logger: &JobLogger,
    ) -> WorkerResult<QualityResult> {
        let key = CacheKey::for_asset(asset, &self.executor_id);

        if let Some(cache) = &self.cache {
            if let Some(result) = cache.load(&key).await? {
                metrics::record_cache_hit(self.executor_id.as_str());
                logger.log_completion("result exists, skipping run");
                return Ok(result);
            }
        }
        metrics::record_cache_miss(self.executor_id.as_str());
        logger.log_start("result does not exist, computing");

        self.validate_sources(asset).await?;

        // Other jobs may share the workdir; it is only removed by its last user
        let lease = self.workdirs.enter(asset.workdir()).await;
        let mut prepared = self.workfiles.prepare(asset).await?;
        let log = LogArtifact::for_asset(asset, &self.executor_id);
        let computed = self.compute(asset, &mut prepared, &log, logger).await;

        // Stop any producer still writing before its pipe is unlinked
        let workfiles = prepared.workfiles().clone();
        drop(prepared);

        if self.delete_workdir {
            if let Err(e) = self.workfiles.teardown(&workfiles).await {
                if computed.is_err() {
                    logger.log_warning(&format!("workfile teardown failed: {}", e));
                } else {
                    return Err(e.into());
                }
            }
        }
        computed?;

        logger.log_progress("reading scores from log");
        let scores = self.hook.parse(&log).await?;
        let result = QualityResult::new(asset.identity(), self.executor_id.clone(), scores);
        if result.is_empty() {
            return Err(WorkerError::external_tool(
                self.hook.type_name(),
                format!("no scores found in {}", log.path().display()),
            ));
        }

        if let Some(cache) = &self.cache {
            cache.save(&key, &result).await?;
        }

        if self.delete_workdir {
            lease
                .leave(|last| async move {
                    if last {
                        log.teardown().await.map(|_| ())
                    } else {
                        log.remove().await
                    }
                })
                .await?;
        }

        logger.log_completion(&format!("{} frames", result.frame_count()));
        Ok(result)
    }

    async fn validate_sources(&self, asset: &AssetDescriptor) -> WorkerResult<()> {
        for path in [&asset.ref_path, &asset.dis_path] {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(WorkerError::PathNotFound(path.clone()));
            }
        }
        Ok(())
    }

    async fn compute(
        &self,
        asset: &AssetDescriptor,
        prepared: &mut PreparedWorkfiles,
        log: &LogArtifact,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        log.prepare(&ExecutorId::log_header(
            self.hook.type_name(),
            self.hook.version(),
        ))
        .await?;

        let workfiles = prepared.workfiles();
        let inputs = ComputeInputs {
            ref_path: workfiles.ref_path().to_path_buf(),
            dis_path: workfiles.dis_path().to_path_buf(),
            dims: asset.quality_dims(),
            pixel_format: asset.pixel_format,
            raw: workfiles.is_transient() || asset.source_format == SourceFormat::Raw,
            runtime_options: (*self.runtime_options).clone(),
        };

        logger.log_progress(&format!("running {}", self.hook.type_name()));
        let start = Instant::now();
        // A streamed producer that dies would leave the tool waiting on its pipe
        let generated = tokio::select! {
            generated = self.hook.generate(&inputs, log) => generated,
            failure = prepared.producer_failure() => Err(transcoder_failure(failure)),
        };
        metrics::record_compute_duration(self.executor_id.as_str(), start.elapsed().as_secs_f64());

        if let Err(e) = generated {
            // A producer failure explains a truncated read better than the tool's error
            return match prepared.finished_producer_error().await {
                Some(failure) => Err(transcoder_failure(failure)),
                None => Err(e),
            };
        }

        if prepared.pending_producers() > 0 {
            prepared
                .join_producers(self.producer_grace)
                .await
                .map_err(transcoder_failure)?;
        }

        Ok(())
    }
}

fn transcoder_failure(err: MediaError) -> WorkerError {
    WorkerError::external_tool("transcoder", err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::PsnrHook;
    use vqrun_models::Scores;

    struct Labelled;

    #[async_trait::async_trait]
    impl ComputeHook for Labelled {
        fn type_name(&self) -> &str {
            "VMAF"
        }
        fn version(&self) -> &str {
            "0.6.1"
        }
        fn options(&self) -> BTreeMap<String, String> {
            let mut options = BTreeMap::new();
            options.insert("model".to_string(), "default".to_string());
            options.insert("enhance".to_string(), "true".to_string());
            options
        }
        async fn generate(&self, _: &ComputeInputs, _: &LogArtifact) -> WorkerResult<()> {
            Ok(())
        }
        async fn parse(&self, _: &LogArtifact) -> WorkerResult<Scores> {
            Ok(Scores::new())
        }
    }

    #[test]
    fn test_identity_includes_sorted_options_only() {
        let executor = Executor::builder(Arc::new(Labelled))
            .runtime_option("model_cache", "/tmp/models")
            .build();

        assert_eq!(
            executor.executor_id().as_str(),
            "VMAF_V0.6.1_enhance_true_model_default"
        );
    }

    #[test]
    fn test_from_config() {
        let config = WorkerConfig {
            parallelize: true,
            max_parallel: 3,
            workfile_mode: WorkfileMode::Materialized,
            ..WorkerConfig::default()
        };
        let executor = Executor::from_config(&config, Arc::new(PsnrHook::new()));

        assert_eq!(executor.executor_id().as_str(), "PSNR_V1.0");
        assert!(executor.runner.is_parallel());
        assert_eq!(executor.runner.max_parallel(), 3);
        assert_eq!(executor.workfiles.mode(), WorkfileMode::Materialized);
        assert!(executor.cache.is_none());
    }
}
