//! Sound handles
//!
//! A `Sound` is the caller-facing handle for one playback request. It carries
//! the timing/fade configuration and a list of event subscribers; every
//! mutating call is forwarded to the owning [`Speaker`](super::Speaker).
//!
//! Lifecycle:
//!
//! ```text
//! Created ──play──▶ Starting ──start ok──▶ Playing ⇄ Paused ──▶ Finished
//!    │                 │
//!    └─────────────────┴──start failed──▶ Finished (error)
//! ```
//!
//! `destroyed` is an orthogonal terminal flag: once set, no further events are
//! delivered and all operations are ignored.

use super::envelope::{FadeWindow, VolumeEnvelope};
use super::speaker::Speaker;
use crate::error::{Error, Result};
use radio_common::time::millis_to_seconds;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Unique identifier of a sound (process lifetime)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SoundId(Uuid);

impl SoundId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event delivered to sound subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SoundEvent {
    /// Playback started or resumed
    Play,
    /// Playback paused
    Pause,
    /// Playback finished; terminal. `error` is set when load/start failed
    Finish { error: bool },
    /// Progress while playing
    Elapse { position_ms: u64, duration_ms: u64 },
}

impl SoundEvent {
    pub fn kind(&self) -> SoundEventKind {
        match self {
            SoundEvent::Play => SoundEventKind::Play,
            SoundEvent::Pause => SoundEventKind::Pause,
            SoundEvent::Finish { .. } => SoundEventKind::Finish,
            SoundEvent::Elapse { .. } => SoundEventKind::Elapse,
        }
    }
}

/// Event kinds a handler can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEventKind {
    Play,
    Pause,
    Finish,
    Elapse,
}

/// Subscriber callback
pub type SoundHandler = Arc<dyn Fn(&SoundEvent) + Send + Sync>;

/// Identifies one registered handler, for `Sound::off_handler`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Per-sound options passed to `Speaker::create`
#[derive(Clone, Default)]
pub struct SoundConfig {
    /// Media position to start from (ms)
    pub start_position_ms: Option<u64>,
    /// Media position at which the sound is force-finished (ms)
    pub end_position_ms: Option<u64>,
    /// Fade-in length from the start position (seconds)
    pub fade_in_seconds: Option<f64>,
    /// Fade-out length before the end of media (seconds)
    pub fade_out_seconds: Option<f64>,
    /// Per-track loudness adjustment (dB)
    pub gain_db: Option<f64>,
    handlers: Vec<(SoundEventKind, SoundHandler)>,
}

impl SoundConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_position_ms(mut self, ms: u64) -> Self {
        self.start_position_ms = Some(ms);
        self
    }

    pub fn end_position_ms(mut self, ms: u64) -> Self {
        self.end_position_ms = Some(ms);
        self
    }

    pub fn fade_in_seconds(mut self, seconds: f64) -> Self {
        self.fade_in_seconds = Some(seconds);
        self
    }

    pub fn fade_out_seconds(mut self, seconds: f64) -> Self {
        self.fade_out_seconds = Some(seconds);
        self
    }

    pub fn gain_db(mut self, gain: f64) -> Self {
        self.gain_db = Some(gain);
        self
    }

    /// Handler for `play` events
    pub fn on_play(self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on(SoundEventKind::Play, move |_| handler())
    }

    /// Handler for `pause` events
    pub fn on_pause(self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on(SoundEventKind::Pause, move |_| handler())
    }

    /// Handler for the `finish` event; receives the error flag
    pub fn on_finish(self, handler: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on(SoundEventKind::Finish, move |event| {
            if let SoundEvent::Finish { error } = event {
                handler(*error);
            }
        })
    }

    /// Handler for `elapse` events; receives position and duration (ms)
    pub fn on_elapse(self, handler: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        self.on(SoundEventKind::Elapse, move |event| {
            if let SoundEvent::Elapse {
                position_ms,
                duration_ms,
            } = event
            {
                handler(*position_ms, *duration_ms);
            }
        })
    }

    /// Handler for any event kind
    pub fn on(
        mut self,
        kind: SoundEventKind,
        handler: impl Fn(&SoundEvent) + Send + Sync + 'static,
    ) -> Self {
        self.handlers.push((kind, Arc::new(handler)));
        self
    }

    /// Reject negative or non-finite fades and inverted positions
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fade_in_seconds", self.fade_in_seconds),
            ("fade_out_seconds", self.fade_out_seconds),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::InvalidSound(format!(
                        "{} must be a finite value >= 0, got {}",
                        name, v
                    )));
                }
            }
        }
        if let Some(gain) = self.gain_db {
            if !gain.is_finite() {
                return Err(Error::InvalidSound(format!("gain_db must be finite, got {}", gain)));
            }
        }
        if let (Some(start), Some(end)) = (self.start_position_ms, self.end_position_ms) {
            if end <= start {
                return Err(Error::InvalidSound(format!(
                    "end_position_ms ({}) must be after start_position_ms ({})",
                    end, start
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SoundConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoundConfig")
            .field("start_position_ms", &self.start_position_ms)
            .field("end_position_ms", &self.end_position_ms)
            .field("fade_in_seconds", &self.fade_in_seconds)
            .field("fade_out_seconds", &self.fade_out_seconds)
            .field("gain_db", &self.gain_db)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Lifecycle phase of a sound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundPhase {
    Created,
    Starting,
    Playing,
    Paused,
    Finished,
}

/// Mutable per-sound state, only changed by the speaker engine
#[derive(Debug)]
pub(crate) struct Lifecycle {
    pub(crate) phase: SoundPhase,
    /// `pause()` arrived while a start or resume call was outstanding
    pub(crate) deferred_pause: bool,
    /// A resume call is outstanding
    pub(crate) resuming: bool,
    pub(crate) fade_out: Option<FadeWindow>,
    fade_out_finalized: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared sound state, referenced by the speaker registry and by handles
pub(crate) struct SoundInner {
    pub(crate) id: SoundId,
    pub(crate) url: String,
    pub(crate) start_position_ms: u64,
    pub(crate) end_position_ms: Option<u64>,
    pub(crate) fade_out_seconds: Option<f64>,
    pub(crate) gain_db: Option<f64>,
    pub(crate) fade_in: Option<FadeWindow>,
    lifecycle: Mutex<Lifecycle>,
    destroyed: AtomicBool,
    handlers: Mutex<Vec<(HandlerId, SoundEventKind, SoundHandler)>>,
    next_handler: AtomicU64,
}

impl SoundInner {
    pub(crate) fn new(url: String, config: SoundConfig) -> Self {
        let start_position_ms = config.start_position_ms.unwrap_or(0);
        let fade_in = config
            .fade_in_seconds
            .and_then(|secs| FadeWindow::fade_in(millis_to_seconds(start_position_ms), secs));

        let inner = Self {
            id: SoundId::new(),
            url,
            start_position_ms,
            end_position_ms: config.end_position_ms,
            fade_out_seconds: config.fade_out_seconds,
            gain_db: config.gain_db,
            fade_in,
            lifecycle: Mutex::new(Lifecycle {
                phase: SoundPhase::Created,
                deferred_pause: false,
                resuming: false,
                fade_out: None,
                fade_out_finalized: false,
            }),
            destroyed: AtomicBool::new(false),
            handlers: Mutex::new(Vec::new()),
            next_handler: AtomicU64::new(0),
        };
        for (kind, handler) in config.handlers {
            inner.add_handler(kind, handler);
        }
        inner
    }

    pub(crate) fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    pub(crate) fn phase(&self) -> SoundPhase {
        self.lifecycle().phase
    }

    /// Compute the fade-out window once the media duration is known
    ///
    /// The window ends at the end position when one is configured before the
    /// end of media, otherwise at the end of media. Only the first call with a
    /// known duration has an effect.
    pub(crate) fn finalize_fade_out(&self, duration_ms: Option<u64>) {
        let Some(duration_ms) = duration_ms else {
            return;
        };
        let mut lifecycle = self.lifecycle();
        if lifecycle.fade_out_finalized {
            return;
        }
        lifecycle.fade_out_finalized = true;

        let end_ms = match self.end_position_ms {
            Some(end) if end < duration_ms => end,
            _ => duration_ms,
        };
        lifecycle.fade_out = self
            .fade_out_seconds
            .and_then(|secs| FadeWindow::fade_out(millis_to_seconds(end_ms), secs));
    }

    pub(crate) fn envelope(&self) -> VolumeEnvelope {
        VolumeEnvelope {
            fade_in: self.fade_in,
            fade_out: self.lifecycle().fade_out,
            gain_db: self.gain_db,
        }
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_destroyed(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.off();
    }

    fn add_handler(&self, kind: SoundEventKind, handler: SoundHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers).push((id, kind, handler));
        id
    }

    fn off(&self) {
        lock(&self.handlers).clear();
    }

    /// Invoke handlers subscribed to `event`'s kind
    ///
    /// Handlers are cloned out of the list first so a handler may subscribe,
    /// unsubscribe or destroy the sound without deadlocking.
    pub(crate) fn trigger(&self, event: &SoundEvent) {
        if self.is_destroyed() {
            return;
        }
        let kind = event.kind();
        let handlers: Vec<SoundHandler> = lock(&self.handlers)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            if self.is_destroyed() {
                return;
            }
            handler(event);
        }
    }
}

/// Caller-facing playback handle
///
/// Cheap to clone; clones refer to the same sound.
#[derive(Clone)]
pub struct Sound {
    pub(crate) inner: Arc<SoundInner>,
    pub(crate) speaker: Speaker,
}

impl Sound {
    pub fn id(&self) -> SoundId {
        self.inner.id
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Start (or resume) playback
    pub fn play(&self) {
        self.speaker.play_sound(self.inner.id);
    }

    /// Pause playback (deferred while a start or resume is outstanding)
    pub fn pause(&self) {
        self.speaker.pause_sound(self.inner.id);
    }

    /// Resume after `pause`
    pub fn resume(&self) {
        self.speaker.resume_sound(self.inner.id);
    }

    /// Unregister the sound and silence it if it is playing
    pub fn destroy(&self) {
        self.speaker.destroy_sound(self.inner.id);
    }

    /// Media position (ms) of the slot playing this sound, 0 if none
    pub fn position(&self) -> u64 {
        self.speaker.sound_position(self.inner.id)
    }

    /// Media duration (ms) of the slot playing this sound, 0 if none/unknown
    pub fn duration(&self) -> u64 {
        self.speaker.sound_duration(self.inner.id)
    }

    pub fn phase(&self) -> SoundPhase {
        self.inner.phase()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// Fade-in window in media seconds, if configured
    pub fn fade_in_window(&self) -> Option<FadeWindow> {
        self.inner.fade_in
    }

    /// Fade-out window in media seconds, once the duration is known
    pub fn fade_out_window(&self) -> Option<FadeWindow> {
        self.inner.lifecycle().fade_out
    }

    /// Subscribe a handler; ignored after `destroy`
    pub fn on(
        &self,
        kind: SoundEventKind,
        handler: impl Fn(&SoundEvent) + Send + Sync + 'static,
    ) -> Option<HandlerId> {
        if self.inner.is_destroyed() {
            return None;
        }
        Some(self.inner.add_handler(kind, Arc::new(handler)))
    }

    /// Remove one handler
    pub fn off_handler(&self, id: HandlerId) {
        lock(&self.inner.handlers).retain(|(h, _, _)| *h != id);
    }

    /// Remove every handler
    pub fn off(&self) {
        self.inner.off();
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("phase", &self.inner.phase())
            .field("destroyed", &self.inner.is_destroyed())
            .finish()
    }
}
