//! Turns farm events into outbound chat alerts.
//!
//! Assessment alerts pass two guards before anything is published: the
//! per-target [`CooldownGuard`] and then the tenant-wide [`RateLimiter`].
//! Both are charged only after the outbound message is on the bus.
//!
//! Every alert is keyed to the inbound event that caused it. Once an alert
//! has gone out, the [`EventLedger`] remembers the event id and a
//! redelivery of the same event is answered with [`AlertOutcome::Duplicate`].

use chrono::{DateTime, Utc};
use event_bus::{subjects, EventEnvelope, EventPublisher};
use rate_guard::{CooldownGuard, EventLedger, RateDecision, RateLimiter, SkipReason};
use uuid::Uuid;

use crate::error::NotifyResult;
use crate::models::{
    AlertLevel, AssessmentCreatedPayload, OutboundMessage, RuleProposedPayload, Severity,
};

/// Limiter alert type for assessment alerts
pub const ASSESSMENT_ALERT: &str = "assessment";

/// Hypotheses listed in an assessment alert
const MAX_LISTED_ISSUES: usize = 3;

/// The inbound event an alert answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSource {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub correlation_id: Uuid,
}

impl AlertSource {
    pub fn of<T>(envelope: &EventEnvelope<T>) -> Self {
        Self {
            event_id: envelope.event_id,
            tenant_id: envelope.tenant_id,
            correlation_id: envelope.correlation_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    Sent(OutboundMessage),
    /// This event already produced its alert
    Duplicate,
    /// The event does not warrant an alert at all
    NotAlertable,
    BelowConfidence,
    CoolingDown { remaining_secs: i64 },
    Limited(SkipReason),
}

#[derive(Clone)]
pub struct Notifier {
    cooldown: CooldownGuard,
    limiter: RateLimiter,
    ledger: EventLedger,
    publisher: EventPublisher,
}

impl Notifier {
    pub fn new(
        cooldown: CooldownGuard,
        limiter: RateLimiter,
        ledger: EventLedger,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            cooldown,
            limiter,
            ledger,
            publisher,
        }
    }

    pub async fn on_assessment(
        &self,
        source: AlertSource,
        payload: &AssessmentCreatedPayload,
        now: DateTime<Utc>,
    ) -> NotifyResult<AlertOutcome> {
        let tenant_id = source.tenant_id;
        if self.is_duplicate(source).await? {
            return Ok(AlertOutcome::Duplicate);
        }
        let Some(level) = assessment_level(payload.severity) else {
            return Ok(AlertOutcome::NotAlertable);
        };

        let target = payload.cooldown_target();
        let check = self
            .cooldown
            .should_alert(tenant_id, &target, payload.confidence, now)
            .await?;
        if !check.allow {
            if check.cooldown_remaining_secs > 0 {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    target = %target,
                    remaining_secs = check.cooldown_remaining_secs,
                    "Assessment alert cooling down"
                );
                return Ok(AlertOutcome::CoolingDown {
                    remaining_secs: check.cooldown_remaining_secs,
                });
            }
            tracing::debug!(
                tenant_id = %tenant_id,
                confidence = payload.confidence,
                "Assessment below alert confidence"
            );
            return Ok(AlertOutcome::BelowConfidence);
        }

        let decision = self.limiter.check(tenant_id, ASSESSMENT_ALERT, now).await?;
        if let RateDecision::Skip(reason) = decision {
            tracing::warn!(
                tenant_id = %tenant_id,
                reason = %reason,
                "Assessment alert rate limited"
            );
            return Ok(AlertOutcome::Limited(reason));
        }

        let message = OutboundMessage {
            level,
            title: "Plant Health Alert".to_string(),
            message: assessment_message(payload),
            source_subject: subjects::ASSESSMENT_CREATED.to_string(),
        };
        self.send(source, &message).await?;

        self.cooldown.record_sent(tenant_id, &target, now).await?;
        self.limiter.record_sent(tenant_id, ASSESSMENT_ALERT, now).await?;
        Ok(AlertOutcome::Sent(message))
    }

    /// Approval requests are not rate limited; only proposals awaiting a
    /// decision are announced.
    pub async fn on_rule_proposed(
        &self,
        source: AlertSource,
        payload: &RuleProposedPayload,
    ) -> NotifyResult<AlertOutcome> {
        if self.is_duplicate(source).await? {
            return Ok(AlertOutcome::Duplicate);
        }
        if !payload.requires_approval {
            return Ok(AlertOutcome::NotAlertable);
        }

        let message = OutboundMessage {
            level: AlertLevel::Info,
            title: "AI Rule Proposal".to_string(),
            message: format!(
                "AI Rule Proposal\n\nType: {}\nConfidence: {:.0}%\n\nReply to approve or reject.",
                payload.intent_type,
                payload.confidence * 100.0
            ),
            source_subject: subjects::RULE_PROPOSED.to_string(),
        };
        self.send(source, &message).await?;
        Ok(AlertOutcome::Sent(message))
    }

    async fn is_duplicate(&self, source: AlertSource) -> NotifyResult<bool> {
        let seen = self
            .ledger
            .already_handled(source.tenant_id, source.event_id)
            .await?;
        if seen {
            tracing::info!(
                tenant_id = %source.tenant_id,
                source_event_id = %source.event_id,
                "Alert already sent for this event, skipping redelivery"
            );
        }
        Ok(seen)
    }

    /// Publish, then record the source event as handled. A crash between
    /// the two can still repeat an alert once.
    async fn send(&self, source: AlertSource, message: &OutboundMessage) -> NotifyResult<()> {
        let envelope = self
            .publisher
            .publish(
                subjects::TELEGRAM_OUTBOUND,
                source.tenant_id,
                message,
                Some(source.correlation_id),
            )
            .await?;
        tracing::info!(
            tenant_id = %source.tenant_id,
            event_id = %envelope.event_id,
            source_event_id = %source.event_id,
            title = %message.title,
            "Alert queued for delivery"
        );
        self.ledger
            .record_handled(source.tenant_id, source.event_id)
            .await?;
        Ok(())
    }
}

fn assessment_level(severity: Severity) -> Option<AlertLevel> {
    match severity {
        Severity::High => Some(AlertLevel::Critical),
        Severity::Medium => Some(AlertLevel::Warn),
        Severity::Low => None,
    }
}

fn assessment_message(payload: &AssessmentCreatedPayload) -> String {
    let issues = payload
        .hypotheses
        .iter()
        .take(MAX_LISTED_ISSUES)
        .map(|h| h.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Plant health assessment: {}\n\nIssues detected: {}",
        payload.severity.as_str().to_uppercase(),
        issues
    )
}
