//! Error types for radio-speaker
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Playback failures are not surfaced through these types to `Sound` callers:
//! a failed load or start ends in a `finish` event with the error flag set.
//! These types cover the seams where a caller does get a `Result` back
//! (initialization, configuration, playlist loading).

use thiserror::Error;

/// Failure reported by a platform audio resource or backend
///
/// `Clone` because one load future may be awaited by several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Audio context could not be acquired (no device, not yet permitted)
    #[error("Audio context unavailable: {0}")]
    ContextUnavailable(String),

    /// Media at the given URL does not exist
    #[error("Media not found: {0}")]
    NotFound(String),

    /// Media was fetched but could not be decoded
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Transport failure while fetching media
    #[error("Network error: {0}")]
    Network(String),

    /// Start requested on a resource that points at silence
    #[error("Resource has no media source")]
    NoSource,
}

/// Main error type for radio-speaker
#[derive(Error, Debug)]
pub enum Error {
    /// Platform capability failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration loaded but holds out-of-range values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid per-sound options
    #[error("Invalid sound options: {0}")]
    InvalidSound(String),

    /// Errors bubbled up from radio-common
    #[error(transparent)]
    Common(#[from] radio_common::Error),
}

/// Convenience Result type using radio-speaker Error
pub type Result<T> = std::result::Result<T, Error>;
