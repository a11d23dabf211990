//! In-memory event bus implementation for testing.
//!
//! Captures every published envelope in order for assertions.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::EventPublisher;

/// In-memory event bus for testing.
///
/// Features:
/// - Event capture for assertions
/// - Failure injection for the next N publishes
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
///
/// bus.publish(envelope).await?;
///
/// assert_eq!(bus.event_count(), 1);
/// assert!(bus.has_event("subscription.renewed"));
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    state: Mutex<BusState>,
}

#[derive(Debug, Default)]
struct BusState {
    published: Vec<EventEnvelope>,
    failures_remaining: usize,
}

impl InMemoryEventBus {
    /// Creates a new empty event bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // === Test Helpers ===

    /// Makes the next `count` publishes fail without recording anything.
    pub fn fail_next(&self, count: usize) {
        self.state().failures_remaining = count;
    }

    /// Returns all published events (for test assertions).
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.state().published.clone()
    }

    /// Returns events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Returns events for a specific aggregate.
    pub fn events_for_aggregate(&self, aggregate_id: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .collect()
    }

    /// Event types in publish order.
    pub fn event_types(&self) -> Vec<String> {
        self.state()
            .published
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Clears all published events (for test isolation).
    pub fn clear(&self) {
        self.state().published.clear();
    }

    /// Returns count of published events.
    pub fn event_count(&self) -> usize {
        self.state().published.len()
    }

    /// Checks if a specific event type was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.state()
            .published
            .iter()
            .any(|e| e.event_type == event_type)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        let mut state = self.state();
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(DomainError::new(
                ErrorCode::ExternalServiceError,
                format!("Simulated publish failure for {}", event.event_type),
            ));
        }
        state.published.push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
