//! # Event Envelope
//!
//! The wire contract for every cross-service message.
//!
//! ## Envelope Fields
//!
//! - `event_id`: unique per publish; consumers deduplicate on it
//! - `event_type`: the dotted subject the envelope was published on
//! - `tenant_id`: the one tenant this event belongs to
//! - `occurred_at`: when the publisher built the envelope
//! - `producer`: service that published it (e.g. "ops", "reporting")
//! - `correlation_id`: shared by every event in one causal chain
//! - `data`: event-specific payload
//!
//! Envelopes are immutable once published. Follow-on events are built with
//! [`EventEnvelope::caused_by`] so the correlation id propagates.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard event envelope
///
/// # Examples
///
/// ```rust
/// use event_bus::EventEnvelope;
/// use uuid::Uuid;
///
/// let tenant = Uuid::new_v4();
/// let request = EventEnvelope::new(
///     "report.requested",
///     tenant,
///     "reporting",
///     serde_json::json!({"report_id": Uuid::new_v4()}),
/// );
///
/// let ready = EventEnvelope::caused_by(
///     &request,
///     "report.ready",
///     "reporting",
///     serde_json::json!({"artifact_key": "tenant/x/reports/y.pdf"}),
/// );
/// assert_eq!(ready.correlation_id, request.correlation_id);
/// assert_ne!(ready.event_id, request.event_id);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique event identifier (idempotency key)
    pub event_id: Uuid,

    /// Dotted subject, e.g. `media.snapshot.created`
    pub event_type: String,

    /// Tenant identifier for multi-tenant isolation
    pub tenant_id: Uuid,

    pub occurred_at: DateTime<Utc>,

    /// Service that published the event
    pub producer: String,

    /// Links related events in a business transaction
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,

    /// Event-specific payload
    pub data: T,
}

impl<T> EventEnvelope<T> {
    /// Create a new envelope with a fresh `event_id` and `correlation_id`.
    pub fn new(
        event_type: impl Into<String>,
        tenant_id: Uuid,
        producer: impl Into<String>,
        data: T,
    ) -> Self {
        Self::with_event_id(Uuid::new_v4(), event_type, tenant_id, producer, data)
    }

    /// Create an envelope with explicit event_id (useful for testing)
    pub fn with_event_id(
        event_id: Uuid,
        event_type: impl Into<String>,
        tenant_id: Uuid,
        producer: impl Into<String>,
        data: T,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            tenant_id,
            occurred_at: Utc::now(),
            producer: producer.into(),
            correlation_id: Uuid::new_v4(),
            data,
        }
    }

    /// Build a follow-on event for the same tenant and causal chain.
    pub fn caused_by<U>(
        parent: &EventEnvelope<U>,
        event_type: impl Into<String>,
        producer: impl Into<String>,
        data: T,
    ) -> Self {
        Self::new(event_type, parent.tenant_id, producer, data)
            .with_correlation_id(Some(parent.correlation_id))
    }

    /// Override the correlation id. `None` keeps the generated one.
    pub fn with_correlation_id(mut self, correlation_id: Option<Uuid>) -> Self {
        if let Some(correlation_id) = correlation_id {
            self.correlation_id = correlation_id;
        }
        self
    }
}

impl<T: Serialize> EventEnvelope<T> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl<T: DeserializeOwned> EventEnvelope<T> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Validate the metadata fields of a raw envelope.
///
/// # Validation Rules
///
/// - `event_id`, `tenant_id`: valid UUIDs
/// - `event_type`: non-empty, no empty dot-segments
/// - `occurred_at`: present
/// - `producer`: non-empty
/// - `correlation_id`: a UUID when present
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    let uuid_field = |name: &str| -> Result<Option<Uuid>, String> {
        match envelope.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => v
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(Some)
                .ok_or_else(|| format!("Invalid {}", name)),
        }
    };

    uuid_field("event_id")?.ok_or("Missing event_id")?;
    uuid_field("tenant_id")?.ok_or("Missing tenant_id")?;
    uuid_field("correlation_id")?;

    let event_type = envelope
        .get("event_type")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid event_type")?;

    if event_type.is_empty() || event_type.split('.').any(str::is_empty) {
        return Err(format!("event_type '{}' is not a dotted subject", event_type));
    }

    envelope
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurred_at")?;

    let producer = envelope
        .get("producer")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid producer")?;

    if producer.is_empty() {
        return Err("producer cannot be empty".to_string());
    }

    if envelope.get("data").is_none() {
        return Err("Missing data".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let tenant = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            "media.snapshot.created",
            tenant,
            "camera",
            json!({"camera_id": "cam-1"}),
        );

        assert_eq!(envelope.tenant_id, tenant);
        assert_eq!(envelope.event_type, "media.snapshot.created");
        assert_eq!(envelope.producer, "camera");
        assert_ne!(envelope.event_id, envelope.correlation_id);
    }

    #[test]
    fn test_each_envelope_gets_its_own_event_id() {
        let tenant = Uuid::new_v4();
        let a = EventEnvelope::new("ops.task.generated", tenant, "ops", json!({}));
        let b = EventEnvelope::new("ops.task.generated", tenant, "ops", json!({}));
        assert_ne!(a.event_id, b.event_id);
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn test_correlation_propagates_through_chain() {
        let tenant = Uuid::new_v4();
        let snapshot = EventEnvelope::new("media.snapshot.created", tenant, "camera", json!({}));
        let detection =
            EventEnvelope::caused_by(&snapshot, "vision.detection.created", "detector", json!({}));
        let assessment = EventEnvelope::caused_by(
            &detection,
            "vision.assessment.created",
            "reasoner",
            json!({}),
        );

        assert_eq!(assessment.correlation_id, snapshot.correlation_id);
        assert_eq!(assessment.tenant_id, tenant);
        assert_ne!(assessment.event_id, detection.event_id);
    }

    #[test]
    fn test_explicit_correlation_id() {
        let correlation = Uuid::new_v4();
        let envelope = EventEnvelope::new("report.requested", Uuid::new_v4(), "reporting", json!({}))
            .with_correlation_id(Some(correlation));
        assert_eq!(envelope.correlation_id, correlation);

        let kept = envelope.clone().with_correlation_id(None);
        assert_eq!(kept.correlation_id, correlation);
    }

    #[test]
    fn test_missing_correlation_id_defaults_on_decode() {
        let raw = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "event_type": "report.requested",
            "tenant_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "occurred_at": "2024-01-01T00:00:00Z",
            "producer": "reporting",
            "data": {"report_id": "x"}
        });

        let envelope: EventEnvelope<serde_json::Value> =
            EventEnvelope::from_bytes(&serde_json::to_vec(&raw).unwrap()).unwrap();
        assert!(!envelope.correlation_id.is_nil());
        assert_eq!(envelope.data["report_id"], "x");
    }

    #[test]
    fn test_validate_envelope_fields_valid() {
        let envelope = serde_json::to_value(EventEnvelope::new(
            "vision.assessment.created",
            Uuid::new_v4(),
            "reasoner",
            json!({"severity": "high"}),
        ))
        .unwrap();

        assert!(validate_envelope_fields(&envelope).is_ok());
    }

    #[test]
    fn test_validate_envelope_fields_missing_tenant_id() {
        let envelope = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "event_type": "report.requested",
            "occurred_at": "2024-01-01T00:00:00Z",
            "producer": "reporting",
            "data": {}
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_rejects_bad_subject() {
        let envelope = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "event_type": "report..requested",
            "tenant_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "occurred_at": "2024-01-01T00:00:00Z",
            "producer": "reporting",
            "data": {}
        });

        assert!(validate_envelope_fields(&envelope).is_err());
    }

    #[test]
    fn test_validate_envelope_fields_non_uuid_tenant() {
        let envelope = json!({
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "event_type": "report.requested",
            "tenant_id": "tenant-123",
            "occurred_at": "2024-01-01T00:00:00Z",
            "producer": "reporting",
            "data": {}
        });

        assert_eq!(
            validate_envelope_fields(&envelope),
            Err("Invalid tenant_id".to_string())
        );
    }
}
