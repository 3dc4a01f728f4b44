//! Platform audio capability
//!
//! The speaker engine never decodes or renders audio itself. It drives three
//! `PlatformAudioResource` instances manufactured by an `AudioBackend`; a
//! concrete adapter binds these traits to whatever native audio stack the host
//! provides. `simulated` is a clock-driven adapter with no audio output, used
//! by the test-suite and the demo binary.
//!
//! Operations that touch network, decode or device start are asynchronous and
//! return boxed `'static` futures, so the engine can await them without
//! holding any of its own locks.

pub mod simulated;

use crate::error::PlatformError;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::broadcast;

pub use simulated::{MediaSpec, SimulatedBackend, SimulatedResource};

/// Notification emitted by a platform resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    /// Periodic playback progress
    PositionUpdate {
        /// Current media position in milliseconds
        position_ms: u64,
    },

    /// Playback paused (by request or by the platform)
    Paused,

    /// Media played to its end
    Ended,
}

/// One playable audio resource (an audio element, a decoder + voice, ...)
///
/// A resource is repointed at new media over its lifetime rather than being
/// recreated per track.
pub trait PlatformAudioResource: Send + Sync {
    /// Point the resource at `url`, or at silence when `None`, and begin loading
    ///
    /// Any playback in progress stops. The future resolves once the media is
    /// ready to start (or loading failed).
    fn load(&self, url: Option<String>) -> BoxFuture<'static, Result<(), PlatformError>>;

    /// Start playback from the beginning of the current media
    ///
    /// Rejects with the load/decode error when the media cannot play.
    /// Resolving `Ok` while `is_playing()` reports false means the platform
    /// accepted the request but throttled or blocked the start.
    fn start(&self) -> BoxFuture<'static, Result<(), PlatformError>>;

    /// Resume playback after `pause`
    fn resume(&self) -> BoxFuture<'static, Result<(), PlatformError>>;

    /// Pause playback, keeping the position
    fn pause(&self);

    /// Move the playhead
    fn seek(&self, position_ms: u64);

    /// Set output volume (0.0 to 1.0)
    fn set_volume(&self, volume: f32);

    /// Current output volume
    fn volume(&self) -> f32;

    /// Current media position in milliseconds
    fn position_ms(&self) -> u64;

    /// Media duration in milliseconds, once decoding has determined it
    fn duration_ms(&self) -> Option<u64>;

    /// Whether audio is currently being produced
    fn is_playing(&self) -> bool;

    /// Subscribe to position/paused/ended notifications
    fn subscribe(&self) -> broadcast::Receiver<ResourceEvent>;
}

/// Factory for the platform audio context and its resources
pub trait AudioBackend: Send + Sync {
    /// Acquire the audio context
    ///
    /// Some hosts only allow this after a user gesture; the engine defers the
    /// call until `Speaker::initialize_audio`.
    fn open(&self) -> BoxFuture<'static, Result<(), PlatformError>>;

    /// Allocate a new resource pointed at silence
    fn create_resource(&self) -> Arc<dyn PlatformAudioResource>;
}
