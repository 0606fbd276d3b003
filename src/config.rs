//! Process-level configuration.
//!
//! Settings come from command-line flags and an optional TOML file.
//! Flags take precedence over file values, which take precedence over the
//! built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::encoder::{
    EncoderSettings, DEFAULT_PAYLOAD_LENGTH, DEFAULT_PAYLOAD_TAG, DEFAULT_RETENTION,
};
use crate::error::{BenchError, BenchResult};
use crate::model::{
    self, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUESTS_PER_WORKER, DEFAULT_WORKERS,
};
use crate::report::OutputFormat;

#[derive(Parser, Debug, Default)]
#[command(name = "ffly-bench")]
#[command(author, version, long_about = None)]
#[command(about = "Parallel write load generator for bitwise-query key-value servers")]
pub struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of parallel connections
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Requests sent on each connection
    #[arg(short = 'n', long)]
    pub requests: Option<u64>,

    /// Target host
    #[arg(long)]
    pub host: Option<String>,

    /// Target port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of random characters in each value
    #[arg(long)]
    pub payload_length: Option<usize>,

    /// Seconds added to the current time for each record's TTL
    #[arg(long)]
    pub retention: Option<u64>,

    /// Literal prefix of each value
    #[arg(long)]
    pub payload_tag: Option<String>,

    /// Give up connecting after this long (e.g. "500ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Cancel workers still running after this long (e.g. "30s")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub deadline: Option<Duration>,

    /// Disable Nagle's algorithm on every connection
    #[arg(long)]
    pub no_delay: bool,

    /// Number of runtime threads (defaults to number of CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Summary format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TomlConfig {
    pub target: TargetConfig,
    pub load: LoadConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,
    pub nodelay: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: None,
            nodelay: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadConfig {
    pub workers: usize,
    pub requests_per_worker: u64,
    pub payload_length: usize,
    pub retention: u64,
    pub payload_tag: String,
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            requests_per_worker: DEFAULT_REQUESTS_PER_WORKER,
            payload_length: DEFAULT_PAYLOAD_LENGTH,
            retention: DEFAULT_RETENTION,
            payload_tag: DEFAULT_PAYLOAD_TAG.to_string(),
            deadline: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub threads: Option<usize>,
    pub format: OutputFormat,
    pub progress: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Fully resolved settings of the process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub run: model::Config,
    pub threads: Option<usize>,
    pub format: OutputFormat,
    pub progress: bool,
    pub log_level: String,
}

impl Settings {
    /// Parses the command line and merges it with the config file it names.
    pub fn load() -> BenchResult<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> BenchResult<Self> {
        let file = match &args.config {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|e| BenchError::ConfigFile {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                toml::from_str(&contents).map_err(|e| BenchError::ConfigFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
            }
            None => TomlConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    fn merge(args: Args, file: TomlConfig) -> Self {
        let run = model::Config {
            workers: args.workers.unwrap_or(file.load.workers),
            requests_per_worker: args.requests.unwrap_or(file.load.requests_per_worker),
            host: args.host.unwrap_or(file.target.host),
            port: args.port.unwrap_or(file.target.port),
            encoder: EncoderSettings {
                payload_length: args.payload_length.unwrap_or(file.load.payload_length),
                retention: args.retention.unwrap_or(file.load.retention),
                payload_tag: args.payload_tag.unwrap_or(file.load.payload_tag),
            },
            connect_timeout: args.connect_timeout.or(file.target.connect_timeout),
            deadline: args.deadline.or(file.load.deadline),
            nodelay: args.no_delay || file.target.nodelay,
        };

        let format = args.format.unwrap_or(file.runtime.format);
        // json output runs without a bar unless the file asks for one
        let progress = !args.no_progress
            && file
                .runtime
                .progress
                .unwrap_or(format == OutputFormat::Human);

        Self {
            run,
            threads: args.threads.or(file.runtime.threads),
            format,
            progress,
            log_level: args.log_level.unwrap_or(file.logging.level),
        }
    }
}
