//! Configuration file resolution and TOML loading
//!
//! Resolution order for the configuration file:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`~/.config/gbp/<file_name>`)
//! 4. Built-in defaults (no file)
//!
//! A missing per-user file is not an error: the caller gets built-in
//! defaults. A file named explicitly on the command line or in the
//! environment must exist.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "GBP_CONFIG";

/// Directory under the platform config dir holding GBP config files
const CONFIG_DIR_NAME: &str = "gbp";

/// Where a configuration file was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed on the command line
    CommandLine(PathBuf),
    /// Path taken from the environment variable
    Environment(PathBuf),
    /// Per-user config file that exists on disk
    UserConfig(PathBuf),
    /// No file, built-in defaults apply
    Defaults,
}

impl ConfigSource {
    /// Path of the file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserConfig(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// Resolve which configuration file to load
pub fn resolve_config_source(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    if let Some(path) = user_config_path(file_name) {
        if path.exists() {
            return ConfigSource::UserConfig(path);
        }
        debug!("No user config at {}", path.display());
    }

    ConfigSource::Defaults
}

/// Per-user config path for the platform, whether or not it exists
pub fn user_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(file_name))
}

/// Load a TOML-backed configuration from the resolved source
///
/// `Defaults` yields `T::default()`. Explicitly named files that are
/// missing or malformed are errors.
pub fn load_toml<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path() else {
        info!("No configuration file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config = parse_toml(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse a TOML document, treating an empty document as defaults
pub fn parse_toml<T>(content: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if content.trim().is_empty() {
        warn!("Configuration file is empty, using built-in defaults");
        return Ok(T::default());
    }
    Ok(toml::from_str(content)?)
}
