//! The counter and the session registry, owned together.
//!
//! A [`Hub`] is created once at startup and shared (behind an `Arc`) with
//! every connection and request handler. The two halves are locked
//! independently; the hub only fixes their call order: increment first,
//! then broadcast the value the increment returned.

use tracing::debug;

use crate::counter::CounterStore;
use crate::registry::BroadcastRegistry;
use crate::wire::ServerMessage;

/// Shared counter plus live-session registry.
#[derive(Debug, Default)]
pub struct Hub {
    counter: CounterStore,
    registry: BroadcastRegistry,
}

impl Hub {
    /// Create a hub with the counter at zero and no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub around an existing counter.
    pub fn with_counter(counter: CounterStore) -> Self {
        Self {
            counter,
            registry: BroadcastRegistry::new(),
        }
    }

    /// The counter store.
    pub const fn counter(&self) -> &CounterStore {
        &self.counter
    }

    /// The session registry.
    pub const fn registry(&self) -> &BroadcastRegistry {
        &self.registry
    }

    /// Current counter value. Does not touch the registry.
    pub fn count(&self) -> u64 {
        self.counter.get()
    }

    /// Increment the counter and broadcast the new value to every joined
    /// session. Returns the new value.
    pub fn increment_and_broadcast(&self) -> u64 {
        let count = self.counter.increment();
        let report = self.registry.broadcast(ServerMessage::Count(count));
        debug!(
            count,
            delivered = report.delivered,
            evicted = report.evicted,
            "count broadcast"
        );
        count
    }
}
