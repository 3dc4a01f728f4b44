//! Sound operations
//!
//! **Responsibilities:**
//! - Sound creation and preparing-slot preloading
//! - Play assembly: wait for media, rotate preparing into active, start
//! - Start resolution against registry membership and the slot start token
//! - Pause (deferred while a start or resume is outstanding), resume, destroy
//!
//! A platform start can take arbitrarily long, and any number of calls can
//! arrive while it is outstanding. Each start carries the slot's start token;
//! when it resolves the engine re-locks and only acts if the token is still
//! current, the slot is still active and the sound is still registered.

use super::core::{Speaker, SpeakerState};
use crate::error::{PlatformError, Result};
use crate::playback::slot::{LoadFuture, SlotRole};
use crate::playback::sound::{Sound, SoundConfig, SoundEvent, SoundId, SoundInner, SoundPhase};
use radio_common::time::millis_to_seconds;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of the locked part of play assembly
enum Rotation {
    /// The play request is no longer wanted
    Abort,
    /// The preparing slot was repointed meanwhile; wait for the new load
    Reload(LoadFuture),
    /// Rotated; wait for the start call on slot `index`
    Started {
        index: usize,
        token: u64,
        start: futures::future::BoxFuture<'static, std::result::Result<(), PlatformError>>,
    },
}

impl Speaker {
    /// Create and register a sound for `url`
    ///
    /// If the audio context exists and the preparing slot is silent, the
    /// media is loaded into it right away; otherwise the URL becomes the
    /// pending prepare URL (replacing any previous one).
    pub fn create(&self, url: impl Into<String>, config: SoundConfig) -> Result<Sound> {
        config.validate()?;
        let inner = Arc::new(SoundInner::new(url.into(), config));

        {
            let mut guard = self.state();
            let state = &mut *guard;
            state.registry.insert(inner.id, Arc::clone(&inner));

            match state.slots.as_mut() {
                Some(slots) if slots.get(SlotRole::Preparing).is_silent() => {
                    debug!("Preloading {} into preparing slot", inner.url);
                    slots
                        .get_mut(SlotRole::Preparing)
                        .point_at(Some(inner.url.clone()));
                }
                _ => {
                    state.pending_prepare = Some(inner.url.clone());
                }
            }
        }

        debug!("Created sound {} for {}", inner.id, inner.url);
        Ok(Sound {
            inner,
            speaker: self.clone(),
        })
    }

    /// Ask for `url` to be loaded into the preparing slot
    ///
    /// Loads immediately when nothing is audible or when the active sound has
    /// played for at least `preload_threshold_ms`; otherwise the URL is kept
    /// pending and retried on the next position update.
    pub fn prepare(&self, url: impl Into<String>) {
        let url = url.into();
        let mut state = self.state();
        self.prepare_locked(&mut state, url);
    }

    pub(super) fn prepare_locked(&self, state: &mut SpeakerState, url: String) {
        let Some(slots) = state.slots.as_mut() else {
            debug!("No audio context yet, {} pending", url);
            state.pending_prepare = Some(url);
            return;
        };

        let active = slots.get(SlotRole::Active);
        let elapsed_ms = active
            .bound
            .as_ref()
            .map(|sound| {
                active
                    .resource
                    .position_ms()
                    .saturating_sub(sound.start_position_ms)
            })
            .unwrap_or(0);
        let ready =
            active.is_silent() || elapsed_ms >= self.inner.config.preload_threshold_ms;

        if !ready {
            state.pending_prepare = Some(url);
            return;
        }

        state.pending_prepare = None;
        let preparing = slots.get_mut(SlotRole::Preparing);
        if preparing.url.as_deref() != Some(url.as_str()) {
            debug!("Preparing {}", url);
            preparing.point_at(Some(url));
        }
    }

    pub(crate) fn play_sound(&self, id: SoundId) {
        let mut guard = self.state();
        let state = &mut *guard;

        let Some(sound) = state.registry.get(&id).cloned() else {
            debug!("play: sound {} is not registered", id);
            return;
        };

        let Some(slots) = state.slots.as_mut() else {
            debug!("play: no audio context, {} pending", sound.url);
            state.pending_prepare = Some(sound.url.clone());
            return;
        };

        match sound.phase() {
            SoundPhase::Finished => {
                debug!("play: sound {} already finished", id);
            }
            SoundPhase::Starting => {
                // A pause requested during start no longer applies
                sound.lifecycle().deferred_pause = false;
            }
            SoundPhase::Playing => {}
            SoundPhase::Paused => {
                if slots.get(SlotRole::Active).is_bound_to(id) {
                    drop(guard);
                    self.resume_sound(id);
                }
            }
            SoundPhase::Created => {
                if let Some(previous) = state.assembling.replace(id) {
                    // Only one play may wait for the preparing slot at a time
                    if let Some(previous) = state.registry.get(&previous).cloned() {
                        debug!("play: {} pre-empted by {}", previous.id, id);
                        self.queue_event(&previous, SoundEvent::Finish { error: false });
                    }
                }
                sound.lifecycle().phase = SoundPhase::Starting;
                tokio::spawn(self.clone().assemble_play(sound));
            }
        }
    }

    /// Load the sound's media into preparing, rotate it into active, start it
    async fn assemble_play(self, sound: Arc<SoundInner>) {
        let mut load = match self.preparing_load(&sound) {
            Some(load) => load,
            None => return,
        };

        loop {
            // Errors surface again through the start call
            let _ = load.await;

            match self.rotate_and_start(&sound) {
                Rotation::Abort => return,
                Rotation::Reload(next) => load = next,
                Rotation::Started {
                    index,
                    token,
                    start,
                } => {
                    let result = start.await;
                    self.on_start_resolved(index, token, &sound, result);
                    return;
                }
            }
        }
    }

    /// Whether a `play` for `sound` is still wanted
    fn still_assembling(state: &SpeakerState, sound: &SoundInner) -> bool {
        state.registry.contains_key(&sound.id)
            && !sound.is_destroyed()
            && sound.phase() == SoundPhase::Starting
            && state.assembling == Some(sound.id)
    }

    /// Load future for the sound's URL in the preparing slot
    fn preparing_load(&self, sound: &SoundInner) -> Option<LoadFuture> {
        let mut guard = self.state();
        if !Self::still_assembling(&guard, sound) {
            if guard.assembling == Some(sound.id) {
                guard.assembling = None;
            }
            return None;
        }
        Self::load_into_preparing(&mut guard, sound)
    }

    /// Reuse the preparing slot's load if it already holds the sound's URL,
    /// otherwise repoint it
    fn load_into_preparing(state: &mut SpeakerState, sound: &SoundInner) -> Option<LoadFuture> {
        let slots = state.slots.as_mut()?;
        let preparing = slots.get_mut(SlotRole::Preparing);

        if let (Some(url), Some(load)) = (&preparing.url, &preparing.load) {
            if *url == sound.url {
                return Some(load.clone());
            }
        }

        if state.pending_prepare.as_deref() == Some(sound.url.as_str()) {
            state.pending_prepare = None;
        }
        debug!("play: loading {} into preparing slot", sound.url);
        Some(preparing.point_at(Some(sound.url.clone())))
    }

    fn rotate_and_start(&self, sound: &Arc<SoundInner>) -> Rotation {
        let mut guard = self.state();
        let state = &mut *guard;

        if !Self::still_assembling(state, sound) {
            debug!("play: sound {} no longer wants to start", sound.id);
            if state.assembling == Some(sound.id) {
                state.assembling = None;
            }
            return Rotation::Abort;
        }

        let preloaded = state.slots.as_ref().map(|slots| {
            slots.get(SlotRole::Preparing).url.as_deref() == Some(sound.url.as_str())
        });
        match preloaded {
            None => return Rotation::Abort,
            Some(false) => {
                // Preparing slot was repointed at another URL while we waited
                return match Self::load_into_preparing(state, sound) {
                    Some(load) => Rotation::Reload(load),
                    None => Rotation::Abort,
                };
            }
            Some(true) => {}
        }

        let volume = state.volume;
        let Some(slots) = state.slots.as_mut() else {
            return Rotation::Abort;
        };
        state.assembling = None;

        slots.swap(SlotRole::Active, SlotRole::Preparing);

        // The previous active slot is now preparing: silence it
        let previous = slots.get_mut(SlotRole::Preparing);
        let pre_empted_start = previous.starting;
        let pre_empted = previous.release();
        if let Some(old) = pre_empted {
            info!("Sound {} pre-empted by {}", old.id, sound.id);
            self.queue_event(&old, SoundEvent::Finish { error: false });
        }
        if let Some(old) = pre_empted_start.and_then(|id| state.registry.get(&id)) {
            info!("Starting sound {} pre-empted by {}", old.id, sound.id);
            self.queue_event(old, SoundEvent::Finish { error: false });
        }

        let index = slots.index(SlotRole::Active);
        let active = slots.get_mut(SlotRole::Active);
        active.bound = None;
        active.start_token += 1;
        active.starting = Some(sound.id);
        let initial = sound
            .envelope()
            .volume_at(millis_to_seconds(sound.start_position_ms), volume);
        active.apply_volume(initial);
        let token = active.start_token;
        let start = active.resource.start();

        self.emit_rotated(slots, SlotRole::Preparing);
        debug!("play: starting {} on slot {}", sound.url, index);

        Rotation::Started {
            index,
            token,
            start,
        }
    }

    fn on_start_resolved(
        &self,
        index: usize,
        token: u64,
        sound: &Arc<SoundInner>,
        result: std::result::Result<(), PlatformError>,
    ) {
        let mut guard = self.state();
        let state = &mut *guard;
        let volume = state.volume;
        let registered = state.registry.contains_key(&sound.id) && !sound.is_destroyed();
        let Some(slots) = state.slots.as_mut() else {
            return;
        };
        let is_active = slots.index(SlotRole::Active) == index;
        let Some(slot) = slots.by_index_mut(index) else {
            return;
        };

        if slot.start_token != token {
            debug!("Stale start for sound {} ignored", sound.id);
            return;
        }
        slot.starting = None;

        match result {
            Err(e) => {
                warn!("Failed to start {}: {}", sound.url, e);
                slot.release();
                if registered {
                    self.queue_event(sound, SoundEvent::Finish { error: true });
                }
            }
            Ok(()) if !registered || !is_active => {
                debug!("Sound {} went away during start, silencing", sound.id);
                slot.release();
            }
            Ok(()) => {
                slot.bound = Some(Arc::clone(sound));
                sound.finalize_fade_out(slot.resource.duration_ms());
                if sound.start_position_ms > 0 {
                    slot.resource.seek(sound.start_position_ms);
                }
                slot.refresh_volume(volume);
                let playing = slot.resource.is_playing();
                info!("Playing {} (sound {})", sound.url, sound.id);
                self.queue_event(sound, SoundEvent::Play);

                let deferred = std::mem::take(&mut sound.lifecycle().deferred_pause);
                if deferred {
                    slot.resource.pause();
                    slots.get(SlotRole::Fading).resource.pause();
                    self.queue_event(sound, SoundEvent::Pause);
                } else if !playing {
                    debug!("Start of {} was throttled or blocked", sound.url);
                    self.queue_event(sound, SoundEvent::Pause);
                }
            }
        }
    }

    pub(crate) fn pause_sound(&self, id: SoundId) {
        let guard = self.state();
        let Some(sound) = guard.registry.get(&id).cloned() else {
            return;
        };
        let Some(slots) = guard.slots.as_ref() else {
            debug!("pause: no audio context");
            return;
        };

        let mut lifecycle = sound.lifecycle();
        let phase = lifecycle.phase;
        match phase {
            SoundPhase::Starting => {
                lifecycle.deferred_pause = true;
            }
            SoundPhase::Paused if lifecycle.resuming => {
                debug!("pause: sound {} deferred until resume resolves", id);
                lifecycle.deferred_pause = true;
            }
            SoundPhase::Playing if slots.get(SlotRole::Active).is_bound_to(id) => {
                drop(lifecycle);
                slots.get(SlotRole::Active).resource.pause();
                slots.get(SlotRole::Fading).resource.pause();
                self.queue_event(&sound, SoundEvent::Pause);
            }
            phase => {
                debug!("pause: sound {} ignored in {:?}", id, phase);
            }
        }
    }

    pub(crate) fn resume_sound(&self, id: SoundId) {
        let (resumes, sound) = {
            let guard = self.state();
            let Some(sound) = guard.registry.get(&id).cloned() else {
                return;
            };
            let Some(slots) = guard.slots.as_ref() else {
                return;
            };

            let mut lifecycle = sound.lifecycle();
            let phase = lifecycle.phase;
            match phase {
                SoundPhase::Starting => {
                    lifecycle.deferred_pause = false;
                    return;
                }
                SoundPhase::Paused if lifecycle.resuming => {
                    // Already on its way back; only a pause made meanwhile is undone
                    lifecycle.deferred_pause = false;
                    return;
                }
                SoundPhase::Paused if slots.get(SlotRole::Active).is_bound_to(id) => {
                    lifecycle.resuming = true;
                    lifecycle.deferred_pause = false;
                }
                phase => {
                    debug!("resume: sound {} ignored in {:?}", id, phase);
                    return;
                }
            }
            drop(lifecycle);

            let mut resumes = vec![slots.get(SlotRole::Active).resource.resume()];
            let fading = slots.get(SlotRole::Fading);
            if fading.bound.is_some() {
                resumes.push(fading.resource.resume());
            }
            (resumes, sound)
        };

        let speaker = self.clone();
        tokio::spawn(async move {
            let results = futures::future::join_all(resumes).await;

            let guard = speaker.state();
            let deferred_pause = {
                let mut lifecycle = sound.lifecycle();
                lifecycle.resuming = false;
                std::mem::take(&mut lifecycle.deferred_pause)
            };
            if let Some(Err(e)) = results.into_iter().next() {
                warn!("Failed to resume {}: {}", sound.url, e);
                return;
            }
            let Some(slots) = guard.slots.as_ref() else {
                return;
            };
            let active = slots.get(SlotRole::Active);
            if !active.is_bound_to(sound.id) || sound.phase() != SoundPhase::Paused {
                return;
            }
            if deferred_pause {
                // Paused again while resuming: stay paused, nothing to report
                debug!("Sound {} paused during resume", sound.id);
                active.resource.pause();
                slots.get(SlotRole::Fading).resource.pause();
            } else if active.resource.is_playing() {
                speaker.queue_event(&sound, SoundEvent::Play);
            }
        });
    }

    pub(crate) fn destroy_sound(&self, id: SoundId) {
        let mut guard = self.state();
        let state = &mut *guard;
        let Some(sound) = state.registry.remove(&id) else {
            return;
        };
        sound.mark_destroyed();
        if state.assembling == Some(id) {
            state.assembling = None;
        }

        let still_wanted = state.registry.values().any(|other| other.url == sound.url);
        if !still_wanted && state.pending_prepare.as_deref() == Some(sound.url.as_str()) {
            state.pending_prepare = None;
        }

        if let Some(slots) = state.slots.as_mut() {
            let active = slots.get_mut(SlotRole::Active);
            if active.is_bound_to(id) {
                active.release();
                debug!("Destroyed active sound {}", id);
            }

            let preparing = slots.get_mut(SlotRole::Preparing);
            if !still_wanted && preparing.url.as_deref() == Some(sound.url.as_str()) {
                debug!("Dropping preload of {}", sound.url);
                preparing.release();
                // The freed slot takes the waiting URL, as `create` would
                if let Some(url) = state.pending_prepare.take() {
                    debug!("Preloading {} into preparing slot", url);
                    preparing.point_at(Some(url));
                }
            }
        }
        debug!("Sound {} destroyed", id);
    }
}
