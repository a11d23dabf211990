//! Event infrastructure for domain event publishing.
//!
//! - `EventId` - Unique identifier for events (deduplication)
//! - `EventMetadata` - Correlation context
//! - `EventEnvelope` - Transport wrapper for domain events
//! - `DomainEvent` - Trait that all domain events implement

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Current schema version of every event this crate emits.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================
// DomainEvent Trait
// ============================================

/// Trait that all domain events must implement.
///
/// Provides the contract for event identification, routing, and ordering.
pub trait DomainEvent: Send + Sync {
    /// Returns the event type string (e.g., "subscription.renewed").
    fn event_type(&self) -> &'static str;

    /// Returns the schema version number.
    fn schema_version(&self) -> u32 {
        SCHEMA_VERSION
    }

    /// Returns the ID of the aggregate that emitted this event.
    fn aggregate_id(&self) -> String;

    /// Returns the type of aggregate (e.g., "Subscription").
    fn aggregate_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> Timestamp;

    /// Returns the unique ID for this event instance.
    fn event_id(&self) -> EventId;
}

/// Unique identifier for events (used for deduplication).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation context attached by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// ID linking related events across a single request or batch run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Idempotency key of the payment that produced this event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Transport envelope for domain events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique ID for this event instance.
    pub event_id: EventId,

    /// Event type for routing (e.g., "subscription.renewed").
    pub event_type: String,

    pub schema_version: u32,

    /// ID of the aggregate that emitted this event.
    pub aggregate_id: String,

    /// Type of aggregate (e.g., "Subscription", "Invoice").
    pub aggregate_type: String,

    /// When the event occurred.
    pub occurred_at: Timestamp,

    /// Event-specific payload as JSON.
    pub payload: JsonValue,

    pub metadata: EventMetadata,
}

impl EventEnvelope {
    /// Creates an envelope from a domain event, serializing it as the payload.
    pub fn from_event<T>(event: &T) -> Result<Self, serde_json::Error>
    where
        T: DomainEvent + Serialize,
    {
        Ok(Self {
            event_id: event.event_id(),
            event_type: event.event_type().to_string(),
            schema_version: event.schema_version(),
            aggregate_id: event.aggregate_id(),
            aggregate_type: event.aggregate_type().to_string(),
            occurred_at: event.occurred_at(),
            payload: serde_json::to_value(event)?,
            metadata: EventMetadata::default(),
        })
    }

    /// Add correlation ID for request tracing.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(id.into());
        self
    }

    /// Add the idempotency key of the originating payment.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.metadata.idempotency_key = Some(key.into());
        self
    }

    /// Deserialize payload to a specific event type.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Pinged {
        event_id: EventId,
        target: String,
        at: Timestamp,
    }

    impl DomainEvent for Pinged {
        fn event_type(&self) -> &'static str {
            "test.pinged"
        }

        fn aggregate_id(&self) -> String {
            self.target.clone()
        }

        fn aggregate_type(&self) -> &'static str {
            "Target"
        }

        fn occurred_at(&self) -> Timestamp {
            self.at
        }

        fn event_id(&self) -> EventId {
            self.event_id.clone()
        }
    }

    fn pinged() -> Pinged {
        Pinged {
            event_id: EventId::from_string("evt-1"),
            target: "t-1".to_string(),
            at: Timestamp::from_unix_secs(1_700_000_000).unwrap(),
        }
    }

    #[test]
    fn event_id_generates_unique_values() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn from_event_copies_routing_fields() {
        let envelope = EventEnvelope::from_event(&pinged()).unwrap();
        assert_eq!(envelope.event_id.as_str(), "evt-1");
        assert_eq!(envelope.event_type, "test.pinged");
        assert_eq!(envelope.schema_version, SCHEMA_VERSION);
        assert_eq!(envelope.aggregate_id, "t-1");
        assert_eq!(envelope.aggregate_type, "Target");
    }

    #[test]
    fn payload_roundtrips_to_event_type() {
        let envelope = EventEnvelope::from_event(&pinged()).unwrap();
        let back: Pinged = envelope.payload_as().unwrap();
        assert_eq!(back, pinged());
    }

    #[test]
    fn metadata_is_omitted_when_empty() {
        let envelope = EventEnvelope::from_event(&pinged()).unwrap();
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["metadata"], serde_json::json!({}));

        let tagged = envelope.with_correlation_id("run-7");
        assert_eq!(tagged.metadata.correlation_id.as_deref(), Some("run-7"));
    }
}
