//! Dispatcher configuration
//!
//! Loaded from an optional TOML file (see `gbp_common::config` for the
//! resolution order). Every field has a built-in default, so an empty or
//! missing file yields a working dedicated-thread dispatcher.
//!
//! ```toml
//! mode = "pooled"
//!
//! [pool]
//! max_threads = 4
//! poll_timeout_us = 100
//! batch_limit = 32
//!
//! [logging]
//! level = "debug"
//! ```

use crate::error::{Error, Result};
use gbp_common::config::{self as common_config, ConfigSource};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up in the per-user config directory
pub const CONFIG_FILE_NAME: &str = "dispatch.toml";

/// How workers are assigned to targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// One blocking thread per started target
    #[default]
    Dedicated,
    /// Bounded thread pool shared by all targets
    Pooled,
}

impl std::fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerMode::Dedicated => write!(f, "dedicated"),
            WorkerMode::Pooled => write!(f, "pooled"),
        }
    }
}

impl std::str::FromStr for WorkerMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dedicated" => Ok(WorkerMode::Dedicated),
            "pooled" => Ok(WorkerMode::Pooled),
            other => Err(Error::Config(format!("Unknown worker mode: {}", other))),
        }
    }
}

/// Shared pool settings (pooled mode only)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of pool threads
    pub max_threads: usize,

    /// How long an idle pool worker polls a target queue before giving
    /// the thread back to the pool
    pub poll_timeout_us: u64,

    /// Commands a pool worker applies to one target before yielding
    pub batch_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 4,
            poll_timeout_us: 100,
            batch_limit: 32,
        }
    }
}

impl PoolConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_micros(self.poll_timeout_us)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: WorkerMode,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

impl DispatchConfig {
    /// Resolve and load the configuration file, then validate it
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let source = common_config::resolve_config_source(
            cli_path,
            common_config::CONFIG_ENV_VAR,
            CONFIG_FILE_NAME,
        );
        Self::load_from(&source)
    }

    /// Load from an already resolved source
    pub fn load_from(source: &ConfigSource) -> Result<Self> {
        let config: DispatchConfig = common_config::load_toml(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DispatchConfig = common_config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool.max_threads == 0 {
            return Err(Error::Config("pool.max_threads must be at least 1".to_string()));
        }
        if self.pool.batch_limit == 0 {
            return Err(Error::Config("pool.batch_limit must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Config with the given mode and defaults elsewhere
    pub fn with_mode(mode: WorkerMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatchConfig::default();
        assert_eq!(config.mode, WorkerMode::Dedicated);
        assert_eq!(config.pool.max_threads, 4);
        assert_eq!(config.pool.poll_timeout(), Duration::from_micros(100));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = DispatchConfig::from_toml_str("mode = \"pooled\"\n[pool]\nmax_threads = 2\n").unwrap();
        assert_eq!(config.mode, WorkerMode::Pooled);
        assert_eq!(config.pool.max_threads, 2);
        assert_eq!(config.pool.batch_limit, 32);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let result = DispatchConfig::from_toml_str("[pool]\nmax_threads = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(DispatchConfig::from_toml_str("mode = \"fibers\"\n").is_err());
        assert!("fibers".parse::<WorkerMode>().is_err());
        assert_eq!("Pooled".parse::<WorkerMode>().unwrap(), WorkerMode::Pooled);
    }
}
