//! # Radio Speaker
//!
//! Crossfading playback control for a single logical output channel.
//!
//! **Purpose:** Play a sequence of media URLs through three rotating platform
//! audio resources (active, fading, preparing), applying fade-in/fade-out
//! envelopes and reporting play/pause/finish/elapse events per sound while
//! media loads asynchronously and may fail or arrive late.
//!
//! **Architecture:** One `Speaker` engine over the `AudioBackend` /
//! `PlatformAudioResource` traits. `platform::simulated` provides a
//! clock-driven adapter used by the tests and the demo binary.

pub mod config;
pub mod error;
pub mod platform;
pub mod playback;
pub mod playlist;

pub use config::SpeakerConfig;
pub use error::{Error, PlatformError, Result};
pub use playback::{
    Sound, SoundConfig, SoundEvent, SoundEventKind, SoundId, SoundPhase, Speaker, SpeakerEvent,
};
