//! Bus subscriptions feeding the [`Notifier`]

use async_trait::async_trait;
use chrono::Utc;
use event_bus::{subjects, BusResult, EventBus, EventEnvelope};
use event_consumer::{start_consumer, ConsumerSpec, EventHandler, HandlerError, HandlerResult};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::alerts::{AlertSource, Notifier};
use crate::models::{AssessmentCreatedPayload, RuleProposedPayload};

pub struct AssessmentAlertHandler {
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for AssessmentAlertHandler {
    async fn handle(&self, envelope: EventEnvelope<serde_json::Value>) -> HandlerResult {
        let source = AlertSource::of(&envelope);
        let payload: AssessmentCreatedPayload = serde_json::from_value(envelope.data)
            .map_err(|e| HandlerError::permanent(format!("invalid assessment payload: {}", e)))?;

        // Counter store or bus trouble: let the broker redeliver.
        self.notifier
            .on_assessment(source, &payload, Utc::now())
            .await
            .map_err(HandlerError::retriable)?;
        Ok(())
    }
}

pub struct RuleProposedHandler {
    notifier: Notifier,
}

#[async_trait]
impl EventHandler for RuleProposedHandler {
    async fn handle(&self, envelope: EventEnvelope<serde_json::Value>) -> HandlerResult {
        let source = AlertSource::of(&envelope);
        let payload: RuleProposedPayload = serde_json::from_value(envelope.data)
            .map_err(|e| HandlerError::permanent(format!("invalid rule proposal payload: {}", e)))?;

        self.notifier
            .on_rule_proposed(source, &payload)
            .await
            .map_err(HandlerError::retriable)?;
        Ok(())
    }
}

/// Subscribe both alert sources under `group`.
pub async fn start_alert_consumers(
    bus: Arc<dyn EventBus>,
    group: &str,
    notifier: Notifier,
) -> BusResult<Vec<JoinHandle<()>>> {
    let assessments = start_consumer(
        bus.clone(),
        ConsumerSpec::new(subjects::ASSESSMENT_CREATED, group),
        Arc::new(AssessmentAlertHandler {
            notifier: notifier.clone(),
        }),
    )
    .await?;

    let proposals = start_consumer(
        bus,
        ConsumerSpec::new(subjects::RULE_PROPOSED, group),
        Arc::new(RuleProposedHandler { notifier }),
    )
    .await?;

    Ok(vec![assessments, proposals])
}
