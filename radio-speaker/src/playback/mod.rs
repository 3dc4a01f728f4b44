//! Playback engine
//!
//! - `speaker`: the slot/prepare orchestration engine
//! - `sound`: caller-facing sound handles and their events
//! - `slot`: the three rotating resource roles
//! - `envelope`: fade-in/fade-out volume computation
//! - `events`: speaker-level notifications

pub mod envelope;
pub mod events;
pub mod slot;
pub mod sound;
mod speaker;

pub use envelope::{gain_adjusted_volume, FadeWindow, VolumeEnvelope};
pub use events::SpeakerEvent;
pub use slot::{SlotRole, SlotSnapshot};
pub use sound::{HandlerId, Sound, SoundConfig, SoundEvent, SoundEventKind, SoundId, SoundPhase};
pub use speaker::Speaker;
