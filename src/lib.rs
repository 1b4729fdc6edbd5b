//! cache-sweep - stale-entry pruning for Gradle-style dependency caches
//!
//! This crate holds the command-line side of the sweeper: layered
//! configuration, console logging, orchestration of the engine in
//! [`sweep_engine`] and the run report.

pub mod app;
pub mod config;
pub mod logging;
pub mod summary;

pub use app::{run_sweep, AppError};
pub use config::{ConfigError, EffectiveConfig, SweepConfig};
pub use summary::SweepReport;
