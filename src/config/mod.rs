//! Sweep configuration
//!
//! Implements a 3-layer configuration merge:
//! 1. Built-in defaults
//! 2. Config file (`--config`, or ~/.config/cache-sweep/config.toml when present)
//! 3. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, SweepConfig, DEFAULT_JOURNAL_RELATIVE,
};
pub use merge::{deep_merge, merge_layers};
