//! Core speaker engine - state, lifecycle and event dispatch
//!
//! **Responsibilities:**
//! - Speaker struct definition and construction
//! - Audio context initialization (idempotent, shared between callers)
//! - Session volume
//! - Sound event queueing and the ordered dispatcher task
//! - Resource notification pumps (one per slot)
//!
//! All engine state sits behind one `std::sync::Mutex` that is never held
//! across an `.await`. Sound events are queued while the lock is held, so their
//! order matches the order of the state changes that produced them; handlers
//! run later on the dispatcher task, outside the lock, and may call back into
//! the Speaker.

use crate::config::SpeakerConfig;
use crate::error::Result;
use crate::platform::{AudioBackend, PlatformAudioResource, ResourceEvent};
use crate::playback::events::SpeakerEvent;
use crate::playback::slot::{Slot, SlotRole, Slots};
use crate::playback::sound::{SoundEvent, SoundId, SoundInner, SoundPhase};
use radio_common::events::EventBus;
use radio_common::time;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, OnceCell};
use tracing::{debug, info, warn};

/// Mutable engine state
pub(super) struct SpeakerState {
    /// `None` until the audio context has been initialized
    pub(super) slots: Option<Slots>,

    /// Session volume (0-100)
    pub(super) volume: u8,

    /// Non-destroyed sounds
    pub(super) registry: HashMap<SoundId, Arc<SoundInner>>,

    /// URL to load into the preparing slot once allowed
    pub(super) pending_prepare: Option<String>,

    /// Sound whose `play` is waiting for its media before rotation
    pub(super) assembling: Option<SoundId>,
}

/// Queued handler invocation
struct Dispatch {
    sound: Arc<SoundInner>,
    event: SoundEvent,
}

pub(super) struct SpeakerInner {
    pub(super) backend: Arc<dyn AudioBackend>,
    pub(super) config: SpeakerConfig,
    pub(super) state: Mutex<SpeakerState>,
    init: OnceCell<()>,
    dispatch_tx: mpsc::UnboundedSender<Dispatch>,
    pub(super) events: EventBus<SpeakerEvent>,
}

/// Playback-scheduling engine
///
/// Coordinates three platform audio resources (active, fading, preparing),
/// crossfades consecutive sounds and reports progress through `Sound` events.
/// Cheap to clone; clones share the same engine.
///
/// All methods that touch slots spawn Tokio tasks and must be called from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct Speaker {
    pub(super) inner: Arc<SpeakerInner>,
}

impl Speaker {
    /// Create a speaker over `backend`
    ///
    /// The audio context is not acquired until [`Speaker::initialize_audio`];
    /// sounds created before that are recorded and loaded on initialization.
    pub fn new(backend: Arc<dyn AudioBackend>, config: SpeakerConfig) -> Self {
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
        let volume = config.initial_volume.min(100);
        let events = EventBus::new(config.event_capacity.max(1));

        let inner = Arc::new(SpeakerInner {
            backend,
            config,
            state: Mutex::new(SpeakerState {
                slots: None,
                volume,
                registry: HashMap::new(),
                pending_prepare: None,
                assembling: None,
            }),
            init: OnceCell::new(),
            dispatch_tx,
            events,
        });

        tokio::spawn(dispatch_loop(dispatch_rx));
        debug!("Speaker created (volume {})", volume);

        Self { inner }
    }

    pub(super) fn state(&self) -> MutexGuard<'_, SpeakerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire the audio context and allocate the three slots
    ///
    /// Idempotent: concurrent callers await the same initialization and later
    /// calls return immediately. If the context cannot be acquired the error
    /// is returned and a later call retries.
    pub async fn initialize_audio(&self) -> Result<()> {
        self.inner
            .init
            .get_or_try_init(|| self.open_audio())
            .await?;
        Ok(())
    }

    async fn open_audio(&self) -> Result<()> {
        info!("Initializing audio context");
        if let Err(e) = self.inner.backend.open().await {
            warn!("Audio context unavailable: {}", e);
            return Err(e.into());
        }

        let resources: [Arc<dyn PlatformAudioResource>; 3] =
            std::array::from_fn(|_| self.inner.backend.create_resource());
        let receivers: Vec<broadcast::Receiver<ResourceEvent>> =
            resources.iter().map(|r| r.subscribe()).collect();

        let loads = {
            let mut state = self.state();
            let pending = state.pending_prepare.take();
            let mut slots = Slots::new(resources.map(Slot::new));
            let loads: Vec<_> = SlotRole::ALL
                .into_iter()
                .map(|role| {
                    let url = match role {
                        SlotRole::Preparing => pending.clone(),
                        _ => None,
                    };
                    slots.get_mut(role).point_at(url)
                })
                .collect();
            if let Some(url) = &pending {
                debug!("Loading pending URL {} into preparing slot", url);
            }
            state.slots = Some(slots);
            loads
        };

        for (index, rx) in receivers.into_iter().enumerate() {
            tokio::spawn(resource_pump(Arc::downgrade(&self.inner), index, rx));
        }

        // Load failures are reported again by the start call that needs the media
        let _ = futures::future::join_all(loads).await;

        info!("Audio context initialized");
        Ok(())
    }

    /// Set the session volume (clamped to 0-100)
    pub fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        {
            let mut guard = self.state();
            let state = &mut *guard;
            state.volume = volume;
            if let Some(slots) = state.slots.as_mut() {
                slots.get_mut(SlotRole::Active).refresh_volume(volume);
                slots.get_mut(SlotRole::Fading).refresh_volume(volume);
            }
        }
        debug!("Volume set to {}", volume);
        self.inner.events.emit_lossy(SpeakerEvent::VolumeChanged {
            volume,
            timestamp: time::now(),
        });
    }

    /// Session volume (0-100)
    pub fn volume(&self) -> u8 {
        self.state().volume
    }

    /// Destroy every registered sound
    pub fn flush(&self) {
        let ids: Vec<SoundId> = self.state().registry.keys().copied().collect();
        debug!("Flushing {} sounds", ids.len());
        for id in ids {
            self.destroy_sound(id);
        }
    }

    /// Subscribe to speaker-level events
    pub fn subscribe(&self) -> broadcast::Receiver<SpeakerEvent> {
        self.inner.events.subscribe()
    }

    /// Queue `event` for `sound`'s handlers and update its lifecycle phase
    ///
    /// Called with the state lock held. Returns false when the event was
    /// suppressed (destroyed sound, or sound already finished).
    pub(super) fn queue_event(&self, sound: &Arc<SoundInner>, event: SoundEvent) -> bool {
        if sound.is_destroyed() {
            return false;
        }
        {
            let mut lifecycle = sound.lifecycle();
            if lifecycle.phase == SoundPhase::Finished {
                return false;
            }
            match event {
                SoundEvent::Play => lifecycle.phase = SoundPhase::Playing,
                SoundEvent::Pause => lifecycle.phase = SoundPhase::Paused,
                SoundEvent::Finish { .. } => {
                    lifecycle.phase = SoundPhase::Finished;
                    lifecycle.deferred_pause = false;
                }
                SoundEvent::Elapse { .. } => {}
            }
        }

        if !matches!(event, SoundEvent::Elapse { .. }) {
            debug!("Sound {} -> {:?}", sound.id, event);
        }
        // Receiver only goes away with the runtime
        let _ = self.inner.dispatch_tx.send(Dispatch {
            sound: Arc::clone(sound),
            event,
        });
        self.inner.events.emit_lossy(SpeakerEvent::Sound {
            id: sound.id,
            event,
            timestamp: time::now(),
        });
        true
    }

    /// Publish a rotation from `previous` (now out of the active role)
    pub(super) fn emit_rotated(&self, slots: &Slots, previous: SlotRole) {
        self.inner.events.emit_lossy(SpeakerEvent::Rotated {
            active: slots.get(SlotRole::Active).url.clone(),
            previous: slots.get(previous).url.clone(),
            timestamp: time::now(),
        });
    }
}

/// Invoke sound handlers in queue order
async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(Dispatch { sound, event }) = rx.recv().await {
        sound.trigger(&event);
    }
    debug!("Sound event dispatcher stopped");
}

/// Forward one resource's notifications to the engine
///
/// Exits when the speaker or the resource goes away.
async fn resource_pump(
    speaker: Weak<SpeakerInner>,
    index: usize,
    mut rx: broadcast::Receiver<ResourceEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(inner) = speaker.upgrade() else {
                    return;
                };
                Speaker { inner }.handle_resource_event(index, event);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Slot {} event pump lagged, skipped {} events", index, skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Slot {} event pump closed", index);
                return;
            }
        }
    }
}
