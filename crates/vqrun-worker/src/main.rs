//! Quality executor binary.
//!
//! Usage: `vqrun-worker <manifest.json> [--remove-results]`
//!
//! Reads a JSON manifest of assets, runs the configured computation kind
//! over them and prints a JSON report to stdout. Exits non-zero when any
//! asset failed.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vqrun_worker::{build_hook, metrics, Executor, RunManifest, RunReport, WorkerConfig};

struct Args {
    manifest: PathBuf,
    remove_results: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut manifest = None;
    let mut remove_results = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--remove-results" => remove_results = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            path if manifest.is_none() => manifest = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument {}", extra),
        }
    }

    let manifest =
        manifest.context("usage: vqrun-worker <manifest.json> [--remove-results]")?;
    Ok(Args {
        manifest,
        remove_results,
    })
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vqrun=info".parse()?);

    // Logs go to stderr; stdout carries the report
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    let args = parse_args()?;
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!("Prometheus exporter listening on {}", addr),
            Err(e) => warn!("Failed to install Prometheus exporter: {}", e),
        }
    }

    let manifest = RunManifest::from_path(&args.manifest).await?;
    let hook = build_hook(&config)?;
    let executor = Executor::from_config(&config, hook)
        .with_runtime_options(manifest.runtime_options.clone());

    if args.remove_results {
        let removed = executor.remove_results(&manifest.assets).await?;
        info!(removed, executor = %executor.executor_id(), "Removed cached results");
        return Ok(());
    }

    info!(
        assets = manifest.assets.len(),
        executor = %executor.executor_id(),
        "Starting quality run"
    );

    let outcomes = executor
        .run(manifest.assets.clone())
        .await
        .context("batch aborted before any job started")?;
    let report = RunReport::new(executor.executor_id().clone(), &manifest.assets, outcomes);

    println!("{}", serde_json::to_string_pretty(&report)?);

    let failed = report.failed();
    if failed > 0 {
        error!(failed, total = report.outcomes.len(), "Quality run finished with failures");
        std::process::exit(1);
    }

    info!("Quality run complete");
    Ok(())
}
