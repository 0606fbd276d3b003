use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::encoder::EncoderSettings;
use crate::error::{BenchError, BenchResult};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 46600;
pub const DEFAULT_WORKERS: usize = 100;
pub const DEFAULT_REQUESTS_PER_WORKER: u64 = 1;

/// Immutable configuration of one benchmark run.
#[derive(Clone, Debug)]
pub struct Config {
    pub workers: usize,
    pub requests_per_worker: u64,
    pub host: String,
    pub port: u16,
    pub encoder: EncoderSettings,
    /// Upper bound on establishing each connection.
    pub connect_timeout: Option<Duration>,
    /// Workers still running when this elapses are cancelled.
    pub deadline: Option<Duration>,
    pub nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            requests_per_worker: DEFAULT_REQUESTS_PER_WORKER,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            encoder: EncoderSettings::default(),
            connect_timeout: None,
            deadline: None,
            nodelay: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> BenchResult<()> {
        if self.workers < 1 {
            return Err(BenchError::invalid("worker count must be at least 1"));
        }
        if self.encoder.payload_length < 1 {
            return Err(BenchError::invalid("payload length must be at least 1"));
        }
        let tag = &self.encoder.payload_tag;
        let printable = tag.bytes().all(|b| b.is_ascii_graphic() || b == b' ');
        if !printable || tag.contains(['\'', ';']) {
            return Err(BenchError::invalid(format!(
                "payload tag {tag:?} must be printable ascii without quotes or semicolons"
            )));
        }
        if self.host.trim().is_empty() {
            return Err(BenchError::invalid("target host must not be empty"));
        }
        if self.port == 0 {
            return Err(BenchError::invalid("target port must not be 0"));
        }
        Ok(())
    }

    /// Total number of data requests the run tries to send.
    pub fn intended_requests(&self) -> u64 {
        self.workers as u64 * self.requests_per_worker
    }
}

/// How a worker's session ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum WorkerOutcome {
    Completed,
    /// No connection could be established; nothing was written.
    ConnectionFailed(String),
    /// A write failed midway; the connection was dropped.
    PartialSend(String),
    /// The run deadline fired before the quota was sent.
    Cancelled,
}

/// Result of a single worker, written once by that worker and read after the
/// join barrier.
#[derive(Clone, Debug, Serialize)]
pub struct WorkerReport {
    pub rank: usize,
    pub intended: u64,
    /// Data requests whose write returned successfully.
    pub sent: u64,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Monotonic time between the first and last write.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub outcome: WorkerOutcome,
}

impl WorkerReport {
    /// Report for a worker that never got to write anything.
    pub fn not_started(rank: usize, intended: u64, outcome: WorkerOutcome) -> Self {
        let now = Utc::now();
        Self {
            rank,
            intended,
            sent: 0,
            begin: now,
            end: now,
            elapsed: Duration::ZERO,
            outcome,
        }
    }
}

/// Aggregate of a whole run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub workers: usize,
    pub requests_per_worker: u64,
    pub intended: u64,
    pub sent: u64,
    pub failed: usize,
    pub partial: usize,
    pub cancelled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Span from just before the first worker was spawned to after the last
    /// one was joined.
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// Requests per second as measured by local write completion, not by
    /// server acknowledgement.
    pub client_send_rate: Option<f64>,
    pub worker_reports: Vec<WorkerReport>,
}

impl RunReport {
    pub fn new(
        config: &Config,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        elapsed: Duration,
        mut worker_reports: Vec<WorkerReport>,
    ) -> Self {
        worker_reports.sort_by_key(|w| w.rank);

        let mut sent = 0;
        let (mut failed, mut partial, mut cancelled) = (0, 0, 0);
        for report in &worker_reports {
            sent += report.sent;
            match report.outcome {
                WorkerOutcome::Completed => {}
                WorkerOutcome::ConnectionFailed(_) => failed += 1,
                WorkerOutcome::PartialSend(_) => partial += 1,
                WorkerOutcome::Cancelled => cancelled += 1,
            }
        }

        Self {
            workers: config.workers,
            requests_per_worker: config.requests_per_worker,
            intended: config.intended_requests(),
            sent,
            failed,
            partial,
            cancelled,
            started_at,
            finished_at,
            elapsed,
            client_send_rate: send_rate(sent, elapsed),
            worker_reports,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.partial == 0 && self.cancelled == 0
    }

    /// Longest interval measured by any single worker.
    pub fn max_worker_elapsed(&self) -> Duration {
        self.worker_reports
            .iter()
            .map(|w| w.elapsed)
            .max()
            .unwrap_or_default()
    }
}

/// Requests per second, undefined when no measurable time passed.
pub fn send_rate(requests: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        Some(requests as f64 / secs)
    } else {
        None
    }
}
