//! `report.requested` consumer

use async_trait::async_trait;
use event_bus::{subjects, BusResult, EventBus, EventEnvelope, RedeliveryPolicy};
use event_consumer::{start_consumer, ConsumerSpec, EventHandler, HandlerError, HandlerResult};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::models::ReportRequestedData;
use crate::pipeline::ReportRunner;

pub struct ReportRequestedHandler {
    runner: ReportRunner,
}

impl ReportRequestedHandler {
    pub fn new(runner: ReportRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl EventHandler for ReportRequestedHandler {
    async fn handle(&self, envelope: EventEnvelope<serde_json::Value>) -> HandlerResult {
        let data: ReportRequestedData = serde_json::from_value(envelope.data)
            .map_err(|e| HandlerError::permanent(format!("invalid report.requested payload: {}", e)))?;

        // Generation failures are recorded on the job; only a failed claim is retried.
        self.runner
            .run(envelope.tenant_id, data.report_id, envelope.correlation_id)
            .await
            .map_err(HandlerError::retriable)?;
        Ok(())
    }
}

/// The ack deadline covers a run with every step at its timeout, so a slow
/// run fails its job itself rather than being cut off by the consumer.
pub async fn start_report_consumer(
    bus: Arc<dyn EventBus>,
    group: &str,
    runner: ReportRunner,
) -> BusResult<JoinHandle<()>> {
    let policy = RedeliveryPolicy {
        ack_wait: runner.run_deadline(),
        ..RedeliveryPolicy::default()
    };

    let lease_outlives_delivery = runner
        .stale_lease()
        .to_std()
        .is_ok_and(|lease| lease > policy.ack_wait);
    if !lease_outlives_delivery {
        tracing::warn!(
            stale_lease_secs = runner.stale_lease().num_seconds(),
            ack_wait_secs = policy.ack_wait.as_secs(),
            "Report stale lease is not longer than the ack deadline; redeliveries may run concurrently"
        );
    }

    start_consumer(
        bus,
        ConsumerSpec::new(subjects::REPORT_REQUESTED, group).with_policy(policy),
        Arc::new(ReportRequestedHandler::new(runner)),
    )
    .await
}
