//! Diagnostics and status accessors
//!
//! **Responsibilities:**
//! - Slot snapshots (role, URL, bound sound, cached volume)
//! - Registry and pending-prepare inspection
//! - Per-sound position/duration lookups used by `Sound`

use super::core::Speaker;
use crate::config::SpeakerConfig;
use crate::playback::slot::SlotSnapshot;
use crate::playback::sound::SoundId;

impl Speaker {
    /// Snapshot of the three slots in role order (empty before initialization)
    pub fn slots(&self) -> Vec<SlotSnapshot> {
        self.state()
            .slots
            .as_ref()
            .map(|slots| slots.snapshot())
            .unwrap_or_default()
    }

    /// Number of registered (non-destroyed) sounds
    pub fn registered_sounds(&self) -> usize {
        self.state().registry.len()
    }

    /// Whether `id` is still registered
    pub fn is_registered(&self, id: SoundId) -> bool {
        self.state().registry.contains_key(&id)
    }

    /// URL waiting to be loaded into the preparing slot
    pub fn pending_prepare(&self) -> Option<String> {
        self.state().pending_prepare.clone()
    }

    /// Whether the audio context has been acquired
    pub fn is_initialized(&self) -> bool {
        self.state().slots.is_some()
    }

    pub fn config(&self) -> &SpeakerConfig {
        &self.inner.config
    }

    pub(crate) fn sound_position(&self, id: SoundId) -> u64 {
        let state = self.state();
        state
            .slots
            .as_ref()
            .and_then(|slots| slots.find_bound(id))
            .map(|slot| slot.resource.position_ms())
            .unwrap_or(0)
    }

    pub(crate) fn sound_duration(&self, id: SoundId) -> u64 {
        let state = self.state();
        state
            .slots
            .as_ref()
            .and_then(|slots| slots.find_bound(id))
            .and_then(|slot| slot.resource.duration_ms())
            .unwrap_or(0)
    }
}
