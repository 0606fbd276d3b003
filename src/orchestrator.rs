//! Spawning, joining and aggregating the workers of a run.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{BenchError, BenchResult};
use crate::model::{Config, RunReport, WorkerOutcome, WorkerReport};
use crate::worker::worker;

/// Runs a benchmark and waits for every worker to terminate.
pub async fn run(config: Config) -> BenchResult<RunReport> {
    run_until(config, CancellationToken::new(), ProgressBar::hidden()).await
}

/// Like [`run`], but workers also stop when `token` is cancelled, and joined
/// workers are counted on `progress`.
///
/// If the config carries a deadline, `token` is cancelled once it elapses and
/// the report only covers what was sent until then.
pub async fn run_until(
    config: Config,
    token: CancellationToken,
    progress: ProgressBar,
) -> BenchResult<RunReport> {
    config.validate()?;
    let addrs = resolve(&config.host, config.port).await?;

    info!(
        addrs = ?addrs,
        workers = config.workers,
        requests_per_worker = config.requests_per_worker,
        payload_length = config.encoder.payload_length,
        retention = config.encoder.retention,
        "Starting benchmark"
    );

    let config = Arc::new(config);
    progress.set_length(config.workers as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} {elapsed_precise} {wide_bar} {pos}/{len} workers")
    {
        progress.set_style(style);
    }

    let started_at = Utc::now();
    let start = Instant::now();

    let deadline = config.deadline.map(|limit| {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!(deadline = ?limit, "deadline reached, cancelling outstanding workers");
            token.cancel();
        })
    });

    // one task per worker, so a blocked connect or write never holds up a sibling
    let tasks: Vec<_> = (0..config.workers)
        .map(|rank| {
            let config = Arc::clone(&config);
            let addrs = Arc::clone(&addrs);
            let token = token.clone();
            let progress = progress.clone();
            tokio::spawn(async move {
                let report = worker(rank, config, addrs, token).await;
                progress.inc(1);
                report
            })
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;
    let reports: Vec<_> = finished_tasks
        .into_iter()
        .enumerate()
        .map(|(rank, task)| {
            task.unwrap_or_else(|e| {
                warn!(rank, error = %e, "worker task did not complete");
                WorkerReport::not_started(
                    rank,
                    config.requests_per_worker,
                    WorkerOutcome::ConnectionFailed(e.to_string()),
                )
            })
        })
        .collect();

    let elapsed = start.elapsed();
    let finished_at = Utc::now();
    progress.finish_and_clear();

    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let report = RunReport::new(&config, started_at, finished_at, elapsed, reports);
    info!(
        sent = report.sent,
        intended = report.intended,
        failed = report.failed,
        partial = report.partial,
        cancelled = report.cancelled,
        elapsed = ?elapsed,
        "Benchmark finished"
    );
    Ok(report)
}

/// Resolves the target once, before any worker is spawned. Workers try the
/// addresses in the order returned here.
async fn resolve(host: &str, port: u16) -> BenchResult<Arc<[SocketAddr]>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| BenchError::invalid(format!("cannot resolve {host}:{port}: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(BenchError::invalid(format!(
            "{host}:{port} resolved to no address"
        )));
    }
    Ok(addrs.into())
}

/// Convenience for callers that want a visible bar on stderr.
pub fn progress_bar(enabled: bool) -> ProgressBar {
    if enabled {
        let bar = ProgressBar::new(0);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    }
}
