//! Parallel write load generator for key-value servers speaking the bitwise
//! query dialect over plain TCP.
//!
//! Every worker owns a single connection, declares the dialect once and then
//! writes its quota of `NEW` statements without ever reading a reply. The
//! reported rate is therefore a client-side send rate.

pub mod config;
pub mod encoder;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod worker;

pub use crate::error::{BenchError, BenchResult};
pub use crate::model::{Config, RunReport, WorkerOutcome, WorkerReport};
pub use crate::orchestrator::{run, run_until};
