//! Broadcast event bus
//!
//! One-to-many event distribution over `tokio::sync::broadcast`. Used by the
//! speaker engine for session-level notifications and by platform audio
//! resources for position/paused/ended notifications.
//!
//! Subscribers only see events emitted after they subscribe. Slow subscribers
//! that fall more than `capacity` events behind observe a `Lagged` error on
//! their receiver and skip the dropped events.

use tokio::sync::broadcast;

/// Broadcast channel wrapper with emit/subscribe helpers
#[derive(Debug)]
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a broadcast channel needs at least one slot).
    ///
    /// # Examples
    ///
    /// ```
    /// use radio_common::events::EventBus;
    ///
    /// let bus: EventBus<u32> = EventBus::new(16);
    /// let mut rx = bus.subscribe();
    /// bus.emit_lossy(7);
    /// assert_eq!(rx.try_recv().unwrap(), 7);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the number of receivers if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: E) -> Result<usize, broadcast::error::SendError<E>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Position updates and other high-rate notifications use this: it is
    /// fine for nobody to be listening.
    pub fn emit_lossy(&self, event: E) {
        let _ = self.emit(event);
    }
}
