//! Configuration for the speaker engine
//!
//! Settings sources priority:
//! 1. Command-line arguments (--config, --volume)
//! 2. Environment variable (`RADIO_SPEAKER_CONFIG` names the TOML file)
//! 3. Per-user TOML file (`<config_dir>/radio-speaker/config.toml`)
//! 4. Built-in defaults (code constants)
//!
//! Every field has a built-in default, so an empty TOML document is a valid
//! configuration.

use crate::error::{Error, Result};
use radio_common::config::{load_or_default, resolve_config_file, ConfigSource};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "RADIO_SPEAKER_CONFIG";

/// Directory name under the platform config dir
pub const APP_NAME: &str = "radio-speaker";

/// Speaker engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeakerConfig {
    /// Session volume at startup (0-100)
    pub initial_volume: u8,

    /// Elapsed playback (ms past the active track's start position) after
    /// which the next track may be preloaded into the preparing slot
    pub preload_threshold_ms: u64,

    /// Interval between position updates emitted by platform resources
    pub position_interval_ms: u64,

    /// Buffer size of the speaker and resource event buses
    pub event_capacity: usize,

    /// Logging configuration (binary only)
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full EnvFilter directive
    pub level: String,
}

impl Default for SpeakerConfig {
    fn default() -> Self {
        Self {
            initial_volume: 100,
            preload_threshold_ms: 20_000,
            position_interval_ms: 250,
            event_capacity: 100,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SpeakerConfig {
    /// Resolve and load the configuration file, then validate it
    ///
    /// `cli_path` takes precedence over the environment variable, which takes
    /// precedence over the per-user config file.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let source = resolve_config_file(cli_path, CONFIG_ENV_VAR, APP_NAME);
        Self::load_from(&source)
    }

    /// Load from an already-resolved source
    pub fn load_from(source: &ConfigSource) -> Result<Self> {
        let config: SpeakerConfig = load_or_default(source).map_err(|e| match e {
            radio_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Common(other),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document (used by tests and embedded configs)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SpeakerConfig = radio_common::config::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.initial_volume > 100 {
            return Err(Error::InvalidConfig(format!(
                "initial_volume must be 0-100, got {}",
                self.initial_volume
            )));
        }
        if self.position_interval_ms < 10 {
            return Err(Error::InvalidConfig(format!(
                "position_interval_ms must be at least 10, got {}",
                self.position_interval_ms
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig(
                "event_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Position update interval as a Duration
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }
}
