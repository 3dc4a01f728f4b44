//! Speaker-level events
//!
//! Published on the Speaker's `EventBus` for observers that are not tied to a
//! single `Sound` (UI state, logging, tests). Per-sound handlers still receive
//! their own events through the `Sound` subscription API; `Sound` variants here
//! mirror those deliveries.

use super::sound::{SoundEvent, SoundId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Notification published by the speaker engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SpeakerEvent {
    /// Session volume changed
    VolumeChanged {
        /// New volume (0-100)
        volume: u8,
        timestamp: DateTime<Utc>,
    },

    /// An event was queued for a sound's handlers
    Sound {
        id: SoundId,
        event: SoundEvent,
        timestamp: DateTime<Utc>,
    },

    /// Two slot roles were swapped
    Rotated {
        /// URL now held by the active slot (`None` = silence)
        active: Option<String>,
        /// URL held by the slot that was rotated out
        previous: Option<String>,
        timestamp: DateTime<Utc>,
    },
}
