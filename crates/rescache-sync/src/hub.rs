//! Event hub broadcasting engine events to subscribers.

use crate::event::SyncEvent;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the broadcast channel.
const BROADCAST_CAPACITY: usize = 1024;

/// Fan-out of [`SyncEvent`]s.
///
/// Emitting never blocks and never fails; events sent while nobody is
/// subscribed are dropped. Slow subscribers observe `Lagged`.
#[derive(Debug)]
pub struct EventHub {
    event_tx: broadcast::Sender<SyncEvent>,
    stats: RwLock<HubStats>,
}

impl EventHub {
    /// Create a new event hub.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            event_tx,
            stats: RwLock::new(HubStats::default()),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SyncEvent) {
        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            match &event {
                SyncEvent::Connected => stats.connects += 1,
                SyncEvent::Disconnected { .. } => stats.disconnects += 1,
                SyncEvent::Error { .. } => stats.errors += 1,
                SyncEvent::Closed => {}
            }
        }

        let receivers = self.event_tx.send(event).unwrap_or(0);
        debug!(receivers, "Event broadcast");
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.event_tx.receiver_count()
    }

    /// Counters of emitted events.
    pub fn stats(&self) -> HubStats {
        *self.stats.read()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters of emitted events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Total events emitted.
    pub total_events: u64,
    /// `Connected` events.
    pub connects: u64,
    /// `Disconnected` events.
    pub disconnects: u64,
    /// `Error` events.
    pub errors: u64,
}
