//! Test helpers for radio-speaker integration tests
//!
//! Provides:
//! - TestRig: a Speaker over a SimulatedBackend with a 250ms position interval
//! - EventRecorder: collects sound events (with clock offsets) across sounds
//! - wait_until: polls a condition against the paused Tokio clock

#![allow(dead_code)]

use radio_speaker::platform::{MediaSpec, SimulatedBackend, SimulatedResource};
use radio_speaker::playback::{SlotRole, SlotSnapshot};
use radio_speaker::{SoundConfig, SoundEvent, SoundEventKind, Speaker, SpeakerConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const POSITION_INTERVAL: Duration = Duration::from_millis(250);

/// Speaker plus the backend behind it
pub struct TestRig {
    pub backend: SimulatedBackend,
    pub speaker: Speaker,
    pub origin: Instant,
}

impl TestRig {
    /// Uninitialized speaker with default configuration
    pub fn new() -> Self {
        Self::with_config(SpeakerConfig::default())
    }

    pub fn with_config(config: SpeakerConfig) -> Self {
        let backend = SimulatedBackend::new(POSITION_INTERVAL);
        let speaker = Speaker::new(Arc::new(backend.clone()), config);
        Self {
            backend,
            speaker,
            origin: Instant::now(),
        }
    }

    /// Speaker with the audio context already initialized
    pub async fn initialized() -> Self {
        let rig = Self::new();
        rig.speaker.initialize_audio().await.unwrap();
        rig
    }

    pub fn media(&self, url: &str, spec: MediaSpec) {
        self.backend.insert_media(url, spec);
    }

    /// Milliseconds since the rig was created
    pub fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    pub fn slot(&self, role: SlotRole) -> SlotSnapshot {
        self.speaker
            .slots()
            .into_iter()
            .find(|s| s.role == role)
            .expect("speaker not initialized")
    }

    /// Resource currently pointed at `url`
    pub fn resource_for(&self, url: &str) -> Option<Arc<SimulatedResource>> {
        self.backend
            .resources()
            .into_iter()
            .find(|r| r.url().as_deref() == Some(url))
    }

    /// Number of slots writing a nonzero volume
    pub fn audible_slots(&self) -> usize {
        self.speaker.slots().iter().filter(|s| s.volume > 0.0).count()
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub label: String,
    pub event: SoundEvent,
    pub at_ms: u64,
}

/// Collects sound events from any number of sounds
#[derive(Clone)]
pub struct EventRecorder {
    origin: Instant,
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add handlers for every event kind, tagged with `label`
    pub fn attach(&self, label: &str, mut config: SoundConfig) -> SoundConfig {
        for kind in [
            SoundEventKind::Play,
            SoundEventKind::Pause,
            SoundEventKind::Finish,
            SoundEventKind::Elapse,
        ] {
            let recorder = self.clone();
            let label = label.to_string();
            config = config.on(kind, move |event| recorder.push(&label, *event));
        }
        config
    }

    fn push(&self, label: &str, event: SoundEvent) {
        let at_ms = self.origin.elapsed().as_millis() as u64;
        self.events.lock().unwrap().push(Recorded {
            label: label.to_string(),
            event,
            at_ms,
        });
    }

    pub fn all(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    /// Events for `label`
    pub fn events(&self, label: &str) -> Vec<SoundEvent> {
        self.all()
            .into_iter()
            .filter(|r| r.label == label)
            .map(|r| r.event)
            .collect()
    }

    /// Events for `label` without `Elapse`
    pub fn lifecycle(&self, label: &str) -> Vec<SoundEvent> {
        self.events(label)
            .into_iter()
            .filter(|e| !matches!(e, SoundEvent::Elapse { .. }))
            .collect()
    }

    /// `(label, event)` pairs without `Elapse`, in delivery order
    pub fn lifecycle_all(&self) -> Vec<(String, SoundEvent)> {
        self.all()
            .into_iter()
            .filter(|r| !matches!(r.event, SoundEvent::Elapse { .. }))
            .map(|r| (r.label, r.event))
            .collect()
    }

    pub fn count(&self, label: &str, kind: SoundEventKind) -> usize {
        self.events(label).iter().filter(|e| e.kind() == kind).count()
    }

    /// Clock offset of the first `kind` event for `label`
    pub fn first_at(&self, label: &str, kind: SoundEventKind) -> Option<u64> {
        self.all()
            .into_iter()
            .find(|r| r.label == label && r.event.kind() == kind)
            .map(|r| r.at_ms)
    }

    /// Positions reported by `Elapse` events for `label`
    pub fn elapse_positions(&self, label: &str) -> Vec<u64> {
        self.events(label)
            .into_iter()
            .filter_map(|e| match e {
                SoundEvent::Elapse { position_ms, .. } => Some(position_ms),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

/// Poll `condition` every 10ms of (paused) clock time until it holds
///
/// Returns false if `timeout` elapses first.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned tasks run without moving the clock meaningfully
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Check a sound's event sequence is a prefix of `play (pause|play)* finish`
/// (or a lone error finish) and that nothing follows `finish`
pub fn assert_valid_sequence(events: &[SoundEvent]) {
    let lifecycle: Vec<&SoundEvent> = events
        .iter()
        .filter(|e| !matches!(e, SoundEvent::Elapse { .. }))
        .collect();

    if let Some(finish) = lifecycle.iter().position(|e| e.kind() == SoundEventKind::Finish) {
        assert_eq!(
            finish,
            lifecycle.len() - 1,
            "events after finish: {:?}",
            lifecycle
        );
        if finish == 0 {
            return;
        }
    }
    if let Some(first) = lifecycle.first() {
        assert_eq!(**first, SoundEvent::Play, "sequence must start with play: {:?}", lifecycle);
    }
    // Elapse only while playing
    let mut playing = false;
    for event in events {
        match event {
            SoundEvent::Play => playing = true,
            SoundEvent::Pause => playing = false,
            SoundEvent::Finish { .. } => playing = false,
            SoundEvent::Elapse { .. } => assert!(playing, "elapse while not playing: {:?}", events),
        }
    }
}
