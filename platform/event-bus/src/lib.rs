//! # EventBus Abstraction
//!
//! The publish/subscribe contract binding independently deployed services.
//!
//! Two delivery modes are exposed:
//!
//! - **Fan-out** via [`EventBus::subscribe`]: every subscriber sees every
//!   matching message. Used by operator tooling and tests that tap a prefix
//!   such as `vision.>`.
//! - **Consumer groups** via [`EventBus::queue_subscribe`]: each message on a
//!   subject is handed to exactly one member of the group. Members must
//!   acknowledge each [`Delivery`]; a negative acknowledgement schedules a
//!   redelivery after a backoff, and after [`RedeliveryPolicy::max_deliver`]
//!   attempts the consumer is expected to dead-letter the message.
//!
//! Delivery is at-least-once. Consumers deduplicate on the envelope's
//! `event_id` when their side effects are not naturally idempotent.
//!
//! ## Implementations
//!
//! - **NatsBus**: NATS JetStream with durable pull consumers
//! - **InMemoryBus**: in-process channels for dev/test
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, EventPublisher, InMemoryBus, RedeliveryPolicy};
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! let mut deliveries = bus
//!     .queue_subscribe("media.snapshot.created", "vision-workers", &RedeliveryPolicy::default())
//!     .await?;
//!
//! let publisher = EventPublisher::new(bus.clone(), "camera-service");
//! publisher
//!     .publish("media.snapshot.created", Uuid::new_v4(), serde_json::json!({"camera_id": "cam-1"}), None)
//!     .await?;
//!
//! if let Some(delivery) = futures::StreamExt::next(&mut deliveries).await {
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

mod connect;
mod delivery;
mod envelope;
mod inmemory_bus;
mod nats_bus;
mod publisher;
pub mod redelivery;
pub mod subjects;

pub use connect::connect_bus;
pub use delivery::{Acker, Delivery};
pub use envelope::{validate_envelope_fields, EventEnvelope};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::{NatsBus, StreamSettings};
pub use publisher::EventPublisher;
pub use redelivery::RedeliveryPolicy;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/topic this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Optional headers
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Optional reply-to subject (for request-response patterns)
    pub reply_to: Option<String>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
            reply_to: None,
        }
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Add a reply-to subject
    pub fn with_reply_to(mut self, reply_to: String) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("failed to acknowledge message: {0}")]
    AckError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject pattern: {0}")]
    InvalidSubject(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::SerializationError(e.to_string())
    }
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core event bus abstraction for publish-subscribe messaging
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject
    ///
    /// Returns once the broker has accepted the message for delivery.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Publish with a broker-side deduplication id.
    ///
    /// Brokers without deduplication fall back to a plain publish.
    async fn publish_with_id(&self, subject: &str, msg_id: &str, payload: Vec<u8>) -> BusResult<()> {
        let _ = msg_id;
        self.publish(subject, payload).await
    }

    /// Fan-out subscription to a subject pattern.
    ///
    /// Supports wildcards:
    /// - `*` matches a single token (e.g., `vision.*.created`)
    /// - `>` matches one or more tokens (e.g., `vision.>`)
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;

    /// Join consumer group `group` on `subject`.
    ///
    /// Every member sharing `group` competes for the same queue, so each
    /// message is delivered to one member at a time. Messages published while
    /// the group has no active member are held until one joins.
    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        policy: &RedeliveryPolicy,
    ) -> BusResult<BoxStream<'static, Delivery>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

/// Check if a subject matches a NATS-style pattern.
///
/// - `*` matches exactly one token
/// - `>` matches one or more trailing tokens
pub fn matches_pattern(subject: &str, pattern: &str) -> bool {
    let subject_parts: Vec<&str> = subject.split('.').collect();
    let pattern_parts: Vec<&str> = pattern.split('.').collect();

    let mut s_idx = 0;
    let mut p_idx = 0;

    while p_idx < pattern_parts.len() {
        let pattern_token = pattern_parts[p_idx];

        if pattern_token == ">" {
            return s_idx < subject_parts.len();
        }

        if s_idx >= subject_parts.len() {
            return false;
        }

        if pattern_token != "*" && pattern_token != subject_parts[s_idx] {
            return false;
        }

        s_idx += 1;
        p_idx += 1;
    }

    s_idx == subject_parts.len()
}
