//! Playlist files for the demo player
//!
//! A playlist is a TOML document with one `[[track]]` table per entry. Each
//! entry names the media URL, the per-sound options passed to
//! `Speaker::create`, and the simulated media behaviour registered with the
//! `SimulatedBackend` before playback.
//!
//! ```toml
//! [[track]]
//! url = "sim://station-id"
//! duration_ms = 8000
//! fade_out_seconds = 2.0
//!
//! [[track]]
//! url = "sim://song"
//! duration_ms = 30000
//! fade_in_seconds = 1.5
//! gain_db = -3.0
//! load_delay_ms = 400
//! ```

use crate::error::{Error, PlatformError, Result};
use crate::platform::{MediaSpec, SimulatedBackend};
use crate::playback::SoundConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Ordered list of tracks
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Playlist {
    #[serde(default, rename = "track")]
    pub tracks: Vec<PlaylistEntry>,
}

/// One playlist track
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaylistEntry {
    pub url: String,

    /// Simulated media length
    pub duration_ms: u64,

    #[serde(default)]
    pub start_position_ms: Option<u64>,
    #[serde(default)]
    pub end_position_ms: Option<u64>,
    #[serde(default)]
    pub fade_in_seconds: Option<f64>,
    #[serde(default)]
    pub fade_out_seconds: Option<f64>,
    #[serde(default)]
    pub gain_db: Option<f64>,

    /// Simulated load latency
    #[serde(default)]
    pub load_delay_ms: u64,

    /// Simulate a decode failure
    #[serde(default)]
    pub fail: bool,
}

impl Playlist {
    /// Load and validate a playlist file
    pub fn load(path: &Path) -> Result<Self> {
        let playlist: Playlist = radio_common::config::load_toml_file(path)?;
        playlist.validate()?;
        Ok(playlist)
    }

    /// Parse and validate a playlist document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let playlist: Playlist = radio_common::config::parse_toml(content)?;
        playlist.validate()?;
        Ok(playlist)
    }

    /// Reject empty playlists and invalid per-track options
    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(Error::InvalidConfig("playlist has no tracks".to_string()));
        }
        for (index, entry) in self.tracks.iter().enumerate() {
            if entry.url.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("track {} has an empty url", index)));
            }
            entry.sound_config().validate()?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Register every track's media with the simulated backend
    pub fn register_media(&self, backend: &SimulatedBackend) {
        for entry in &self.tracks {
            backend.insert_media(entry.url.clone(), entry.media_spec());
        }
    }
}

impl PlaylistEntry {
    /// Per-sound options (handlers are attached by the caller)
    pub fn sound_config(&self) -> SoundConfig {
        let mut config = SoundConfig::new();
        config.start_position_ms = self.start_position_ms;
        config.end_position_ms = self.end_position_ms;
        config.fade_in_seconds = self.fade_in_seconds;
        config.fade_out_seconds = self.fade_out_seconds;
        config.gain_db = self.gain_db;
        config
    }

    /// Simulated media behaviour for this track
    pub fn media_spec(&self) -> MediaSpec {
        let spec = if self.fail {
            MediaSpec::failing(PlatformError::Decode(format!(
                "simulated decode failure for {}",
                self.url
            )))
        } else {
            MediaSpec::new(self.duration_ms)
        };
        spec.with_load_delay(Duration::from_millis(self.load_delay_ms))
    }
}
