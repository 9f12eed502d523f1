use crate::{BusResult, EventBus, EventEnvelope};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Builds envelopes for one producing service and hands them to the bus.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    producer: String,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, producer: impl Into<String>) -> Self {
        Self {
            bus,
            producer: producer.into(),
        }
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Wrap `data` in a fresh envelope and publish it on `subject`.
    ///
    /// A missing `correlation_id` starts a new causal chain.
    pub async fn publish<T: Serialize>(
        &self,
        subject: &str,
        tenant_id: Uuid,
        data: T,
        correlation_id: Option<Uuid>,
    ) -> BusResult<EventEnvelope<T>> {
        let envelope = EventEnvelope::new(subject, tenant_id, self.producer.as_str(), data)
            .with_correlation_id(correlation_id);
        self.publish_envelope(&envelope).await?;
        Ok(envelope)
    }

    /// Publish a prebuilt envelope on its `event_type`.
    ///
    /// The broker message id is the `event_id`, so retrying the same
    /// envelope is collapsed by brokers that deduplicate.
    pub async fn publish_envelope<T: Serialize>(&self, envelope: &EventEnvelope<T>) -> BusResult<()> {
        let payload = envelope.to_bytes()?;
        self.bus
            .publish_with_id(&envelope.event_type, &envelope.event_id.to_string(), payload)
            .await?;

        tracing::debug!(
            event_id = %envelope.event_id,
            subject = %envelope.event_type,
            tenant_id = %envelope.tenant_id,
            correlation_id = %envelope.correlation_id,
            producer = %envelope.producer,
            "Event published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBus;
    use futures::StreamExt;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_wraps_data_in_envelope() {
        let bus = Arc::new(InMemoryBus::new());
        let mut stream = bus.subscribe("media.>").await.unwrap();
        let publisher = EventPublisher::new(bus.clone(), "camera");

        let tenant = Uuid::new_v4();
        let sent = publisher
            .publish("media.snapshot.created", tenant, json!({"camera_id": "cam-1"}), None)
            .await
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        let received: EventEnvelope<serde_json::Value> =
            EventEnvelope::from_bytes(&msg.payload).unwrap();

        assert_eq!(received, sent);
        assert_eq!(received.producer, "camera");
        assert_eq!(received.tenant_id, tenant);
        assert_eq!(received.data["camera_id"], "cam-1");
    }

    #[tokio::test]
    async fn test_publish_keeps_given_correlation_id() {
        let bus = Arc::new(InMemoryBus::new());
        let publisher = EventPublisher::new(bus, "reporting");
        let correlation = Uuid::new_v4();

        let sent = publisher
            .publish("report.ready", Uuid::new_v4(), json!({}), Some(correlation))
            .await
            .unwrap();

        assert_eq!(sent.correlation_id, correlation);
    }
}
