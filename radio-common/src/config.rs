//! Configuration file resolution and TOML loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config_dir>/<app_name>/config.toml`)
//! 4. None: caller falls back to built-in defaults
//!
//! A missing file at step 3 is not an error. A path given explicitly at
//! step 1 or 2 that does not exist is reported, since the user asked for it.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a resolved configuration file came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path passed on the command line
    CommandLine(PathBuf),
    /// Path read from an environment variable
    Environment(PathBuf),
    /// Per-user config file in the platform config directory
    UserConfig(PathBuf),
    /// No file found; built-in defaults apply
    Defaults,
}

impl ConfigSource {
    /// Path of the file to load, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserConfig(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

/// Resolve which configuration file to use
///
/// # Arguments
/// * `cli_arg` - Path given on the command line, if any
/// * `env_var_name` - Environment variable consulted second
/// * `app_name` - Directory name under the platform config dir
pub fn resolve_config_file(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    app_name: &str,
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
    if let Some(path) = default_config_path(app_name) {
        if path.exists() {
            return ConfigSource::UserConfig(path);
        }
        debug!("No user config at {}", path.display());
    }

    ConfigSource::Defaults
}

/// Platform default location of the config file for `app_name`
///
/// Linux: `~/.config/<app_name>/config.toml`, macOS:
/// `~/Library/Application Support/<app_name>/config.toml`, Windows:
/// `%APPDATA%\<app_name>\config.toml`.
pub fn default_config_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(app_name).join("config.toml"))
}

/// Parse a TOML document into `T`
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Load and parse a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_toml(&content)
}

/// Load configuration from a resolved source, falling back to `T::default()`
///
/// Explicit sources (command line, environment) must exist. The user config
/// file is only used when present, so a read failure there degrades to
/// defaults with a warning. Parse errors are always reported.
pub fn load_or_default<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match source {
        ConfigSource::Defaults => {
            info!("No configuration file found, using built-in defaults");
            Ok(T::default())
        }
        ConfigSource::UserConfig(path) => match std::fs::read_to_string(path) {
            Ok(content) => {
                info!("Loading configuration from {}", path.display());
                parse_toml(&content)
            }
            Err(e) => {
                warn!(
                    "Could not read {} ({}), using built-in defaults",
                    path.display(),
                    e
                );
                Ok(T::default())
            }
        },
        ConfigSource::CommandLine(path) | ConfigSource::Environment(path) => {
            info!("Loading configuration from {}", path.display());
            load_toml_file(path)
        }
    }
}
