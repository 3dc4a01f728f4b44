//! Clock-driven simulated audio backend
//!
//! Plays a catalog of virtual media against the Tokio clock. No samples are
//! produced: position is derived from the time elapsed since start, and a
//! periodic interval task publishes `PositionUpdate` notifications the same
//! way a real adapter forwards its platform's progress callbacks.
//!
//! Media behaviour is scripted per URL with [`MediaSpec`]: duration, load and
//! start latency, load/decode failure, and blocked (autoplay-denied) starts.
//! Under `tokio::time::pause()` the whole backend is deterministic.

use super::{AudioBackend, PlatformAudioResource, ResourceEvent};
use crate::error::PlatformError;
use futures::future::BoxFuture;
use futures::FutureExt;
use radio_common::events::EventBus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Scripted behaviour of one virtual media URL
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSpec {
    /// Media length in milliseconds
    pub duration_ms: u64,
    /// Time taken by `load`
    pub load_delay: Duration,
    /// Time taken by `start`
    pub start_delay: Duration,
    /// Failure reported by `load` and `start`
    pub failure: Option<PlatformError>,
    /// `start` resolves Ok but playback does not begin (autoplay policy)
    pub blocked_start: bool,
}

impl MediaSpec {
    /// Playable media of the given length with no latency
    pub fn new(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            load_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            failure: None,
            blocked_start: false,
        }
    }

    /// Media that fails to load and start with `error`
    pub fn failing(error: PlatformError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new(0)
        }
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    pub fn blocked(mut self) -> Self {
        self.blocked_start = true;
        self
    }
}

type Catalog = Arc<Mutex<HashMap<String, MediaSpec>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn delay(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

struct BackendInner {
    catalog: Catalog,
    position_interval: Duration,
    event_capacity: usize,
    open_delay: Mutex<Duration>,
    open_failure: Mutex<Option<PlatformError>>,
    open_count: AtomicUsize,
    resources: Mutex<Vec<Arc<SimulatedResource>>>,
}

/// Simulated audio backend
///
/// Cloning shares the catalog and the list of created resources.
#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<BackendInner>,
}

impl SimulatedBackend {
    /// Create a backend whose resources report position every `position_interval`
    pub fn new(position_interval: Duration) -> Self {
        Self::with_capacity(position_interval, 100)
    }

    /// Create a backend with a specific resource event-bus capacity
    pub fn with_capacity(position_interval: Duration, event_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BackendInner {
                catalog: Arc::new(Mutex::new(HashMap::new())),
                position_interval,
                event_capacity: event_capacity.max(1),
                open_delay: Mutex::new(Duration::ZERO),
                open_failure: Mutex::new(None),
                open_count: AtomicUsize::new(0),
                resources: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register (or replace) the media served at `url`
    pub fn insert_media(&self, url: impl Into<String>, spec: MediaSpec) {
        lock(&self.inner.catalog).insert(url.into(), spec);
    }

    /// Make the next `open` call fail with `error`
    pub fn fail_next_open(&self, error: PlatformError) {
        *lock(&self.inner.open_failure) = Some(error);
    }

    /// Delay applied to every `open` call
    pub fn set_open_delay(&self, delay: Duration) {
        *lock(&self.inner.open_delay) = delay;
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    /// All resources created so far, in creation order
    pub fn resources(&self) -> Vec<Arc<SimulatedResource>> {
        lock(&self.inner.resources).clone()
    }
}

impl AudioBackend for SimulatedBackend {
    fn open(&self) -> BoxFuture<'static, Result<(), PlatformError>> {
        let inner = Arc::clone(&self.inner);
        async move {
            let open_delay = *lock(&inner.open_delay);
            delay(open_delay).await;
            if let Some(error) = lock(&inner.open_failure).take() {
                return Err(error);
            }
            inner.open_count.fetch_add(1, Ordering::SeqCst);
            debug!("Simulated audio context opened");
            Ok(())
        }
        .boxed()
    }

    fn create_resource(&self) -> Arc<dyn PlatformAudioResource> {
        let mut resources = lock(&self.inner.resources);
        let resource = SimulatedResource::spawn(
            resources.len(),
            Arc::clone(&self.inner.catalog),
            self.inner.position_interval,
            self.inner.event_capacity,
        );
        resources.push(Arc::clone(&resource));
        resource
    }
}

struct SimState {
    url: Option<String>,
    media: Option<MediaSpec>,
    /// Incremented on every `load`
    generation: u64,
    load_error: Option<PlatformError>,
    playing: bool,
    /// Position at `started_at` (or the frozen position while paused)
    base_position_ms: u64,
    started_at: Option<Instant>,
    volume: f32,
}

impl SimState {
    fn position_at(&self, now: Instant) -> u64 {
        let elapsed = self
            .started_at
            .map(|s| now.saturating_duration_since(s).as_millis() as u64)
            .unwrap_or(0);
        let position = self.base_position_ms + elapsed;
        match &self.media {
            Some(media) => position.min(media.duration_ms),
            None => position,
        }
    }

    fn freeze(&mut self, now: Instant) {
        self.base_position_ms = self.position_at(now);
        self.started_at = None;
        self.playing = false;
    }
}

/// One simulated audio resource
pub struct SimulatedResource {
    id: usize,
    catalog: Catalog,
    state: Arc<Mutex<SimState>>,
    events: Arc<EventBus<ResourceEvent>>,
    /// Generation of the most recently completed load
    loaded_tx: watch::Sender<u64>,
}

impl SimulatedResource {
    fn spawn(
        id: usize,
        catalog: Catalog,
        position_interval: Duration,
        event_capacity: usize,
    ) -> Arc<Self> {
        let (loaded_tx, _) = watch::channel(0);
        let resource = Arc::new(Self {
            id,
            catalog,
            state: Arc::new(Mutex::new(SimState {
                url: None,
                media: None,
                generation: 0,
                load_error: None,
                playing: false,
                base_position_ms: 0,
                started_at: None,
                volume: 1.0,
            })),
            events: Arc::new(EventBus::new(event_capacity)),
            loaded_tx,
        });

        tokio::spawn(position_ticker(
            id,
            Arc::downgrade(&resource.state),
            Arc::downgrade(&resource.events),
            position_interval,
        ));

        resource
    }

    /// Creation index within the backend
    pub fn id(&self) -> usize {
        self.id
    }

    /// URL the resource currently points at
    pub fn url(&self) -> Option<String> {
        lock(&self.state).url.clone()
    }
}

/// Periodic position publisher
///
/// Exits once the owning resource is dropped.
async fn position_ticker(
    id: usize,
    state: Weak<Mutex<SimState>>,
    events: Weak<EventBus<ResourceEvent>>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let (Some(state), Some(events)) = (state.upgrade(), events.upgrade()) else {
            trace!("Resource {} dropped, position ticker exiting", id);
            return;
        };

        let notifications = {
            let mut st = lock(&state);
            if !st.playing {
                continue;
            }
            let now = Instant::now();
            let position_ms = st.position_at(now);
            let duration_ms = st.media.as_ref().map(|m| m.duration_ms).unwrap_or(0);

            if position_ms >= duration_ms {
                st.freeze(now);
                vec![
                    ResourceEvent::PositionUpdate { position_ms },
                    ResourceEvent::Ended,
                ]
            } else {
                vec![ResourceEvent::PositionUpdate { position_ms }]
            }
        };

        for event in notifications {
            events.emit_lossy(event);
        }
    }
}

impl PlatformAudioResource for SimulatedResource {
    fn load(&self, url: Option<String>) -> BoxFuture<'static, Result<(), PlatformError>> {
        let generation = {
            let mut st = lock(&self.state);
            st.freeze(Instant::now());
            st.generation += 1;
            st.url = url.clone();
            st.media = None;
            st.load_error = None;
            st.base_position_ms = 0;
            st.generation
        };
        let spec = url
            .as_ref()
            .and_then(|u| lock(&self.catalog).get(u).cloned());

        let state = Arc::clone(&self.state);
        let loaded_tx = self.loaded_tx.clone();
        async move {
            let result = match (&url, spec) {
                (None, _) => Ok(None),
                (Some(u), None) => Err(PlatformError::NotFound(u.clone())),
                (Some(_), Some(spec)) => {
                    delay(spec.load_delay).await;
                    match spec.failure.clone() {
                        Some(error) => Err(error),
                        None => Ok(Some(spec)),
                    }
                }
            };

            let mut st = lock(&state);
            if st.generation != generation {
                // Repointed while loading; the newer load owns the state
                return Ok(());
            }
            let outcome = match result {
                Ok(media) => {
                    st.media = media;
                    Ok(())
                }
                Err(error) => {
                    st.load_error = Some(error.clone());
                    Err(error)
                }
            };
            drop(st);
            loaded_tx.send_replace(generation);
            outcome
        }
        .boxed()
    }

    fn start(&self) -> BoxFuture<'static, Result<(), PlatformError>> {
        let state = Arc::clone(&self.state);
        let mut loaded_rx = self.loaded_tx.subscribe();
        let id = self.id;
        async move {
            let (generation, start_delay) = {
                let st = lock(&state);
                let start_delay = st.media.as_ref().map(|m| m.start_delay).unwrap_or_default();
                (st.generation, start_delay)
            };
            if generation == 0 {
                return Err(PlatformError::NoSource);
            }
            // Wait for the current media to finish loading
            let _ = loaded_rx.wait_for(|done| *done >= generation).await;
            delay(start_delay).await;

            let mut st = lock(&state);
            if st.generation != generation {
                debug!("Resource {} repointed during start", id);
                return Ok(());
            }
            if let Some(error) = st.load_error.clone() {
                return Err(error);
            }
            let Some(media) = st.media.clone() else {
                return Err(PlatformError::NoSource);
            };
            st.base_position_ms = 0;
            if media.blocked_start {
                st.playing = false;
                st.started_at = None;
            } else {
                st.playing = true;
                st.started_at = Some(Instant::now());
            }
            Ok(())
        }
        .boxed()
    }

    fn resume(&self) -> BoxFuture<'static, Result<(), PlatformError>> {
        let state = Arc::clone(&self.state);
        async move {
            let mut st = lock(&state);
            let Some(media) = st.media.clone() else {
                return Err(st.load_error.clone().unwrap_or(PlatformError::NoSource));
            };
            if !st.playing && st.base_position_ms < media.duration_ms {
                st.playing = true;
                st.started_at = Some(Instant::now());
            }
            Ok(())
        }
        .boxed()
    }

    fn pause(&self) {
        let was_playing = {
            let mut st = lock(&self.state);
            let was_playing = st.playing;
            st.freeze(Instant::now());
            was_playing
        };
        if was_playing {
            self.events.emit_lossy(ResourceEvent::Paused);
        }
    }

    fn seek(&self, position_ms: u64) {
        let mut st = lock(&self.state);
        let duration_ms = st.media.as_ref().map(|m| m.duration_ms).unwrap_or(0);
        st.base_position_ms = position_ms.min(duration_ms);
        if st.playing {
            st.started_at = Some(Instant::now());
        }
    }

    fn set_volume(&self, volume: f32) {
        lock(&self.state).volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        lock(&self.state).volume
    }

    fn position_ms(&self) -> u64 {
        lock(&self.state).position_at(Instant::now())
    }

    fn duration_ms(&self) -> Option<u64> {
        lock(&self.state).media.as_ref().map(|m| m.duration_ms)
    }

    fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }
}
