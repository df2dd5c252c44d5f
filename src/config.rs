//! Runtime configuration.
//!
//! Controls the engine thread pool, the operation cache and diagnostics. Pass
//! a [`Config`] to [`runtime::startup`](crate::runtime::startup), or `None`
//! for the defaults below.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! concurrency_level = 1       # engine threads per operation (0 = one per core)
//! max_cache_files = 0         # file-backed cache entries (0 disables)
//! max_cache_mem = 52428800    # bytes held by the operation cache
//! max_cache_size = 100        # operation cache entries
//! report_leaks = false        # log live images at shutdown
//! cache_trace = false         # log cache hits and misses
//! collect_stats = false       # count calls per operation
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONCURRENCY_LEVEL: usize = 1;
pub const DEFAULT_MAX_CACHE_MEM: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_CACHE_SIZE: usize = 100;
pub const DEFAULT_MAX_CACHE_FILES: usize = 0;

const MAX_CONCURRENCY_LEVEL: usize = 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine tuning applied at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Worker threads used by a single operation. `0` lets the pool pick one
    /// thread per core.
    pub concurrency_level: usize,
    /// Maximum number of memoised file loads. `0` disables file caching.
    pub max_cache_files: usize,
    /// Maximum bytes of pixel data held by the operation cache.
    pub max_cache_mem: u64,
    /// Maximum number of operation cache entries.
    pub max_cache_size: usize,
    /// Log every live native image when the runtime shuts down.
    pub report_leaks: bool,
    /// Log every cache hit and miss.
    pub cache_trace: bool,
    /// Count calls per operation, see [`operation_counts`](crate::runtime::operation_counts).
    pub collect_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_level: DEFAULT_CONCURRENCY_LEVEL,
            max_cache_files: DEFAULT_MAX_CACHE_FILES,
            max_cache_mem: DEFAULT_MAX_CACHE_MEM,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            report_leaks: false,
            cache_trace: false,
            collect_stats: false,
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_level > MAX_CONCURRENCY_LEVEL {
            return Err(ConfigError::Validation(format!(
                "concurrency_level must be at most {MAX_CONCURRENCY_LEVEL}"
            )));
        }
        if usize::try_from(self.max_cache_mem).is_err() {
            return Err(ConfigError::Validation(
                "max_cache_mem does not fit in addressable memory".into(),
            ));
        }
        Ok(())
    }

    /// The thread count the engine pool should use.
    ///
    /// - `0` → one thread per available core
    /// - `n` → exactly `n`
    pub fn effective_threads(&self) -> usize {
        if self.concurrency_level == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.concurrency_level
        }
    }
}
