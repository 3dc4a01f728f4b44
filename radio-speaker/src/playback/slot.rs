//! Slots: the three rotating audio resource roles
//!
//! Each [`Slot`] wraps one platform resource for the lifetime of the engine.
//! [`Slots`] maps the three roles (`active`, `fading`, `preparing`) onto slot
//! indices; rotation swaps two entries of that table instead of moving
//! resources around.

use super::sound::{SoundId, SoundInner};
use crate::error::PlatformError;
use crate::platform::PlatformAudioResource;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use radio_common::time::millis_to_seconds;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Load future shared between the preparing driver and `play` assembly
pub(crate) type LoadFuture = Shared<BoxFuture<'static, Result<(), PlatformError>>>;

/// Role a slot currently plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    /// Audible, current track
    Active,
    /// Previous track fading to silence
    Fading,
    /// Next track loading
    Preparing,
}

impl SlotRole {
    pub const ALL: [SlotRole; 3] = [SlotRole::Active, SlotRole::Fading, SlotRole::Preparing];

    fn position(self) -> usize {
        match self {
            SlotRole::Active => 0,
            SlotRole::Fading => 1,
            SlotRole::Preparing => 2,
        }
    }
}

impl fmt::Display for SlotRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlotRole::Active => "active",
            SlotRole::Fading => "fading",
            SlotRole::Preparing => "preparing",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of one slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSnapshot {
    pub role: SlotRole,
    /// Slot index (stable for the engine lifetime)
    pub index: usize,
    /// Media the resource points at (`None` = silence)
    pub url: Option<String>,
    /// Sound bound to the slot
    pub bound: Option<SoundId>,
    /// Sound whose start call is outstanding on this slot
    pub starting: Option<SoundId>,
    /// Last volume written to the resource
    pub volume: f32,
}

pub(crate) struct Slot {
    pub(crate) resource: Arc<dyn PlatformAudioResource>,
    pub(crate) url: Option<String>,
    pub(crate) bound: Option<Arc<SoundInner>>,
    /// Incremented whenever an outstanding start becomes stale
    pub(crate) start_token: u64,
    pub(crate) starting: Option<SoundId>,
    pub(crate) load: Option<LoadFuture>,
    current_volume: f32,
}

impl Slot {
    pub(crate) fn new(resource: Arc<dyn PlatformAudioResource>) -> Self {
        resource.set_volume(0.0);
        Self {
            resource,
            url: None,
            bound: None,
            start_token: 0,
            starting: None,
            load: None,
            current_volume: 0.0,
        }
    }

    /// Repoint the resource at `url` (or silence) and start loading it
    ///
    /// The load is driven to completion by a background task; the returned
    /// future may be awaited as well. Must be called within a Tokio runtime.
    pub(crate) fn point_at(&mut self, url: Option<String>) -> LoadFuture {
        let load = self.resource.load(url.clone()).shared();
        self.url = url.clone();
        self.load = Some(load.clone());

        let driver = load.clone();
        tokio::spawn(async move {
            if let Err(e) = driver.await {
                match url {
                    Some(url) => warn!("Failed to load {}: {}", url, e),
                    None => debug!("Failed to point resource at silence: {}", e),
                }
            }
        });
        load
    }

    /// Whether the resource points at silence
    pub(crate) fn is_silent(&self) -> bool {
        self.url.is_none()
    }

    pub(crate) fn is_bound_to(&self, id: SoundId) -> bool {
        self.bound.as_ref().is_some_and(|s| s.id == id)
    }

    pub(crate) fn volume(&self) -> f32 {
        self.current_volume
    }

    /// Write `volume` to the resource if it differs from the cached value
    pub(crate) fn apply_volume(&mut self, volume: f32) {
        if volume != self.current_volume {
            self.resource.set_volume(volume);
            self.current_volume = volume;
        }
    }

    /// Recompute the bound sound's envelope at the current position
    pub(crate) fn refresh_volume(&mut self, base_volume: u8) {
        let Some(sound) = &self.bound else {
            return;
        };
        let t = millis_to_seconds(self.resource.position_ms());
        let volume = sound.envelope().volume_at(t, base_volume);
        self.apply_volume(volume);
    }

    /// Pause, mute and repoint at silence; returns the unbound sound
    ///
    /// Any outstanding start on this slot becomes stale.
    pub(crate) fn release(&mut self) -> Option<Arc<SoundInner>> {
        let bound = self.bound.take();
        self.starting = None;
        self.start_token += 1;
        self.resource.pause();
        self.apply_volume(0.0);
        if !self.is_silent() {
            self.point_at(None);
        }
        bound
    }
}

/// The three slots plus the role → index table
pub(crate) struct Slots {
    slots: [Slot; 3],
    roles: [usize; 3],
}

impl Slots {
    pub(crate) fn new(slots: [Slot; 3]) -> Self {
        Self {
            slots,
            roles: [0, 1, 2],
        }
    }

    pub(crate) fn index(&self, role: SlotRole) -> usize {
        self.roles[role.position()]
    }

    pub(crate) fn get(&self, role: SlotRole) -> &Slot {
        &self.slots[self.index(role)]
    }

    pub(crate) fn get_mut(&mut self, role: SlotRole) -> &mut Slot {
        let index = self.index(role);
        &mut self.slots[index]
    }

    pub(crate) fn by_index_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub(crate) fn role_of(&self, index: usize) -> Option<SlotRole> {
        SlotRole::ALL
            .into_iter()
            .find(|role| self.index(*role) == index)
    }

    /// Swap which slots hold roles `a` and `b`
    pub(crate) fn swap(&mut self, a: SlotRole, b: SlotRole) {
        self.roles.swap(a.position(), b.position());
    }

    /// Slot whose bound sound is `id`
    pub(crate) fn find_bound(&self, id: SoundId) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.is_bound_to(id))
    }

    pub(crate) fn snapshot(&self) -> Vec<SlotSnapshot> {
        SlotRole::ALL
            .into_iter()
            .map(|role| {
                let index = self.index(role);
                let slot = &self.slots[index];
                SlotSnapshot {
                    role,
                    index,
                    url: slot.url.clone(),
                    bound: slot.bound.as_ref().map(|s| s.id),
                    starting: slot.starting,
                    volume: slot.current_volume,
                }
            })
            .collect()
    }
}
