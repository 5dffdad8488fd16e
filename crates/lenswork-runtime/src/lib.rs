//! # Lenswork Runtime
//!
//! Task execution runtime: schedules workflow functions on background
//! workers, converts their outcomes into task records, and sweeps
//! expired tasks on an interval.

mod config;
mod runtime;

pub use config::{ConfigError, RuntimeConfig};
pub use runtime::{RuntimeError, Sweeper, TaskRuntime};
