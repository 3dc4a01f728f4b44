//! Resource notification handling
//!
//! **Responsibilities:**
//! - Envelope recomputation on every position update
//! - End-position and end-of-media force finish
//! - Fade-out-triggered rotation of active into fading
//! - Fading tail cleanup
//! - External pause detection
//! - Retrying the pending prepare URL

use super::core::Speaker;
use crate::platform::ResourceEvent;
use crate::playback::slot::{SlotRole, Slots};
use crate::playback::sound::{SoundEvent, SoundPhase};
use radio_common::time::millis_to_seconds;
use tracing::{debug, info};

impl Speaker {
    /// Apply one notification from the resource in slot `index`
    pub(super) fn handle_resource_event(&self, index: usize, event: ResourceEvent) {
        let mut guard = self.state();
        let state = &mut *guard;
        let volume = state.volume;
        let Some(slots) = state.slots.as_mut() else {
            return;
        };
        let Some(role) = slots.role_of(index) else {
            return;
        };

        match (role, event) {
            (SlotRole::Active, ResourceEvent::PositionUpdate { position_ms }) => {
                self.on_active_position(slots, position_ms, volume);
                if let Some(url) = state.pending_prepare.take() {
                    self.prepare_locked(state, url);
                }
            }
            (SlotRole::Active, ResourceEvent::Ended) => {
                self.force_finish(slots, "end of media");
            }
            (SlotRole::Active, ResourceEvent::Paused) => {
                let active = slots.get(SlotRole::Active);
                if let Some(sound) = active.bound.clone() {
                    if sound.phase() == SoundPhase::Playing {
                        debug!("Sound {} paused by the platform", sound.id);
                        self.queue_event(&sound, SoundEvent::Pause);
                    }
                }
            }
            (SlotRole::Fading, ResourceEvent::PositionUpdate { position_ms }) => {
                let fading = slots.get_mut(SlotRole::Fading);
                let Some(sound) = fading.bound.clone() else {
                    return;
                };
                let t = millis_to_seconds(position_ms);
                if sound.envelope().past_fade_out(t) {
                    debug!("Fade-out of {} complete", sound.url);
                    fading.release();
                } else {
                    fading.refresh_volume(volume);
                }
            }
            (SlotRole::Fading, ResourceEvent::Ended) => {
                let fading = slots.get_mut(SlotRole::Fading);
                if fading.bound.is_some() {
                    fading.release();
                }
            }
            _ => {}
        }
    }

    fn on_active_position(&self, slots: &mut Slots, position_ms: u64, volume: u8) {
        let active = slots.get_mut(SlotRole::Active);
        let Some(sound) = active.bound.clone() else {
            return;
        };
        if sound.phase() != SoundPhase::Playing {
            return;
        }

        if sound.end_position_ms.is_some_and(|end| position_ms >= end) {
            self.force_finish(slots, "end position");
            return;
        }

        let envelope = sound.envelope();
        let t = millis_to_seconds(position_ms);
        active.apply_volume(envelope.volume_at(t, volume));

        if envelope.in_fade_out(t) {
            // Silence any older tail before it is replaced
            let fading = slots.get_mut(SlotRole::Fading);
            if let Some(old) = fading.release() {
                debug!("Dropping fading tail of {}", old.url);
            }
            slots.swap(SlotRole::Active, SlotRole::Fading);
            info!("Fading out {} at {}ms", sound.url, position_ms);
            self.queue_event(&sound, SoundEvent::Finish { error: false });
            self.emit_rotated(slots, SlotRole::Fading);
        } else {
            let duration_ms = active.resource.duration_ms().unwrap_or(0);
            self.queue_event(
                &sound,
                SoundEvent::Elapse {
                    position_ms,
                    duration_ms,
                },
            );
        }
    }

    /// Silence and unbind the active slot, finishing its sound
    fn force_finish(&self, slots: &mut Slots, reason: &str) {
        let active = slots.get_mut(SlotRole::Active);
        if let Some(sound) = active.release() {
            info!("Finishing {} ({})", sound.url, reason);
            self.queue_event(&sound, SoundEvent::Finish { error: false });
        }
    }
}
