use event_bus::{
    validate_envelope_fields, BusResult, Delivery, EventBus, EventEnvelope, RedeliveryPolicy,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::dlq::{publish_dead_letter, DeadLetter};
use crate::handler::{EventHandler, HandlerError};

/// Where a consumer listens and how failures are redelivered.
#[derive(Debug, Clone)]
pub struct ConsumerSpec {
    pub subject: String,
    pub group: String,
    pub policy: RedeliveryPolicy,
}

impl ConsumerSpec {
    pub fn new(subject: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
            policy: RedeliveryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// How one delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Retried,
    DeadLettered,
}

/// Subscribe `handler` to `spec.subject` within `spec.group`.
///
/// The subscription is registered before this returns, so events published
/// afterwards reach the group. The spawned task runs until the delivery
/// stream ends.
pub async fn start_consumer(
    bus: Arc<dyn EventBus>,
    spec: ConsumerSpec,
    handler: Arc<dyn EventHandler>,
) -> BusResult<JoinHandle<()>> {
    let mut stream = bus
        .queue_subscribe(&spec.subject, &spec.group, &spec.policy)
        .await?;

    tracing::info!(subject = %spec.subject, group = %spec.group, "Subscribed");

    Ok(tokio::spawn(async move {
        while let Some(delivery) = stream.next().await {
            process_delivery(bus.as_ref(), &spec, handler.as_ref(), delivery).await;
        }

        tracing::warn!(subject = %spec.subject, group = %spec.group, "Consumer stopped");
    }))
}

/// Decode, dispatch and settle one delivery.
pub async fn process_delivery(
    bus: &dyn EventBus,
    spec: &ConsumerSpec,
    handler: &dyn EventHandler,
    delivery: Delivery,
) -> Outcome {
    let attempt = delivery.attempt;

    let envelope = match decode_envelope(delivery.payload()) {
        Ok(envelope) => envelope,
        Err(reason) => {
            tracing::error!(
                subject = %spec.subject,
                group = %spec.group,
                error = %reason,
                "Malformed envelope"
            );
            return dead_letter(bus, spec, delivery, &format!("malformed envelope: {}", reason)).await;
        }
    };

    let span = tracing::info_span!(
        "consume",
        subject = %spec.subject,
        group = %spec.group,
        event_id = %envelope.event_id,
        tenant_id = %envelope.tenant_id,
        correlation_id = %envelope.correlation_id,
        producer = %envelope.producer,
        attempt = attempt,
    );

    async move {
        let result = match tokio::time::timeout(spec.policy.ack_wait, handler.handle(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Retriable(format!(
                "handler exceeded ack deadline of {:?}",
                spec.policy.ack_wait
            ))),
        };

        match result {
            Ok(()) => {
                if let Err(e) = delivery.ack().await {
                    // The broker will redeliver; the handler is idempotent.
                    tracing::warn!(error = %e, "Ack failed");
                }
                Outcome::Acked
            }
            Err(HandlerError::Permanent(reason)) => {
                tracing::error!(error = %reason, "Permanent handler failure");
                dead_letter(bus, spec, delivery, &reason).await
            }
            Err(HandlerError::Retriable(reason)) if spec.policy.exhausted(attempt) => {
                tracing::error!(
                    error = %reason,
                    max_deliver = spec.policy.max_deliver,
                    "Redelivery exhausted"
                );
                dead_letter(bus, spec, delivery, &reason).await
            }
            Err(HandlerError::Retriable(reason)) => {
                let delay = spec.policy.backoff_for(attempt);
                tracing::warn!(
                    error = %reason,
                    backoff_ms = delay.as_millis() as u64,
                    "Handler failed, scheduling redelivery"
                );
                if let Err(e) = delivery.nak(delay).await {
                    tracing::warn!(error = %e, "Nak failed; broker ack deadline will redeliver");
                }
                Outcome::Retried
            }
        }
    }
    .instrument(span)
    .await
}

/// Parse and check envelope metadata. Redelivery cannot fix a failure here.
fn decode_envelope(payload: &[u8]) -> Result<EventEnvelope<serde_json::Value>, String> {
    let raw: serde_json::Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    validate_envelope_fields(&raw)?;
    serde_json::from_value(raw).map_err(|e| e.to_string())
}

async fn dead_letter(
    bus: &dyn EventBus,
    spec: &ConsumerSpec,
    delivery: Delivery,
    reason: &str,
) -> Outcome {
    let letter = DeadLetter::new(
        &spec.subject,
        &spec.group,
        delivery.attempt,
        reason,
        delivery.payload(),
    );

    match publish_dead_letter(bus, &letter).await {
        Ok(()) => {
            tracing::error!(
                subject = %spec.subject,
                group = %spec.group,
                attempt = delivery.attempt,
                error = %reason,
                "Event moved to DLQ"
            );
            if let Err(e) = delivery.term().await {
                tracing::warn!(error = %e, "Term after dead-letter failed");
            }
            Outcome::DeadLettered
        }
        Err(e) => {
            // Keep the message in the broker rather than losing it.
            let delay = spec.policy.max_backoff;
            tracing::error!(
                subject = %spec.subject,
                error = %reason,
                dlq_error = %e,
                "Failed to publish dead letter, leaving message for redelivery"
            );
            if let Err(e) = delivery.nak(delay).await {
                tracing::warn!(error = %e, "Nak failed");
            }
            Outcome::Retried
        }
    }
}
