//! Domain events emitted by core services after state changes.
//!
//! The reactive UI binding is a presentation-layer concern; core code
//! only pushes events through the `DomainEventSink` trait.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::auth::AuthState;

/// Events emitted by the session manager and goal sync engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The session moved to a new authentication state.
    SessionChanged { state: AuthState },

    /// The in-memory goal list changed (optimistic apply, reconcile,
    /// rollback, or reload).
    GoalsChanged,

    /// A pending-change replay pass finished.
    SyncCompleted { synced: usize, failed: usize },
}

/// Trait for receiving domain events.
///
/// `emit()` must be fast and non-blocking; implementations should queue
/// events for async processing. Failure to deliver must not affect the
/// originating operation.
pub trait DomainEventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// No-op implementation for contexts that don't observe events.
#[derive(Clone, Default)]
pub struct NoOpDomainEventSink;

impl DomainEventSink for NoOpDomainEventSink {
    fn emit(&self, _event: DomainEvent) {
        // Intentionally empty - events are discarded
    }
}

/// Collects emitted events, for tests.
#[derive(Clone, Default)]
pub struct MockDomainEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MockDomainEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DomainEventSink for MockDomainEventSink {
    fn emit(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sink_collects_events() {
        let sink = MockDomainEventSink::new();
        sink.emit(DomainEvent::GoalsChanged);
        sink.emit(DomainEvent::SyncCompleted {
            synced: 2,
            failed: 1,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], DomainEvent::GoalsChanged);
    }
}
