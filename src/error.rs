use std::fmt;
use std::path::PathBuf;

/// Errors that abort a benchmark run before any worker is spawned.
///
/// Failures of individual workers are not errors of the run; they are
/// recorded as [`WorkerOutcome`](crate::model::WorkerOutcome)s and tallied in
/// the final report.
#[derive(Debug)]
pub enum BenchError {
    /// The run configuration cannot be executed as given.
    InvalidConfiguration(String),
    /// A configuration file could not be read or parsed.
    ConfigFile { path: PathBuf, reason: String },
    /// The async runtime could not be started.
    Runtime(std::io::Error),
}

impl BenchError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        BenchError::InvalidConfiguration(reason.into())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::InvalidConfiguration(reason) => {
                write!(f, "invalid configuration: {reason}")
            }
            BenchError::ConfigFile { path, reason } => {
                write!(f, "failed to load config file '{}': {reason}", path.display())
            }
            BenchError::Runtime(e) => write!(f, "failed to start runtime: {e}"),
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

pub type BenchResult<T> = Result<T, BenchError>;
