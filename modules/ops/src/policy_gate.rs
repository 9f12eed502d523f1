//! Policy gate for AI rule proposals
//!
//! Decides whether a proposal may skip human approval. The checks run in a
//! fixed order and the first failure wins; its reason is what lands in the
//! audit trail. A denial is an ordinary outcome, not an error.

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::models::{AiRuleCreation, TenantSettings};

pub const AUTO_ACTIVATION_THRESHOLD: f64 = 0.8;

pub const APPROVED_REASON: &str = "Approved for auto-activation";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub can_auto_activate: bool,
    pub reason: String,
}

impl GateDecision {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            can_auto_activate: false,
            reason: reason.into(),
        }
    }

    fn approve() -> Self {
        Self {
            can_auto_activate: true,
            reason: APPROVED_REASON.to_string(),
        }
    }
}

/// Inputs the gate reads besides the proposal itself.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub settings: Option<&'a TenantSettings>,
    /// Proposals activated since the start of the current UTC day.
    pub activated_today: i64,
}

pub fn evaluate(ctx: GateContext<'_>, proposed_rule: &Value, confidence: f64) -> GateDecision {
    let Some(settings) = ctx.settings else {
        return GateDecision::deny("Tenant settings not found");
    };

    if settings.ai_rule_creation != AiRuleCreation::Allow {
        return GateDecision::deny("Tenant policy requires manual approval");
    }

    if !settings.ai_auto_activation {
        return GateDecision::deny("Auto-activation disabled");
    }

    if confidence < AUTO_ACTIVATION_THRESHOLD {
        return GateDecision::deny(format!(
            "Confidence {:.2} below threshold {}",
            confidence, AUTO_ACTIVATION_THRESHOLD
        ));
    }

    if ctx.activated_today >= i64::from(settings.max_daily_rule_changes) {
        return GateDecision::deny(format!(
            "Daily change limit ({}) reached",
            settings.max_daily_rule_changes
        ));
    }

    if let Some(device) = target_device(proposed_rule) {
        if settings.protected_devices.iter().any(|d| d == device) {
            return GateDecision::deny(format!("Device {} is protected", device));
        }
    }

    GateDecision::approve()
}

/// `action.device_id` of a proposed rule, if it names one.
pub fn target_device(proposed_rule: &Value) -> Option<&str> {
    proposed_rule
        .pointer("/action/device_id")
        .and_then(Value::as_str)
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn permissive() -> TenantSettings {
        TenantSettings {
            ai_rule_creation: AiRuleCreation::Allow,
            ai_auto_activation: true,
            protected_devices: vec!["pump-1".into()],
            ..TenantSettings::defaults(Uuid::new_v4())
        }
    }

    fn ctx(settings: &TenantSettings, activated_today: i64) -> GateContext<'_> {
        GateContext {
            settings: Some(settings),
            activated_today,
        }
    }

    fn rule_for(device: &str) -> Value {
        json!({"trigger": {"sensor": "soil_moisture", "below": 20}, "action": {"device_id": device}})
    }

    #[test]
    fn test_missing_settings() {
        let decision = evaluate(
            GateContext {
                settings: None,
                activated_today: 0,
            },
            &json!({}),
            1.0,
        );
        assert_eq!(decision, GateDecision::deny("Tenant settings not found"));
    }

    #[test]
    fn test_suggest_only_wins_over_everything_else() {
        let settings = TenantSettings::defaults(Uuid::new_v4());
        let decision = evaluate(ctx(&settings, 99), &rule_for("pump-1"), 0.1);
        assert_eq!(decision.reason, "Tenant policy requires manual approval");
    }

    #[test]
    fn test_auto_activation_disabled() {
        let settings = TenantSettings {
            ai_auto_activation: false,
            ..permissive()
        };
        let decision = evaluate(ctx(&settings, 0), &rule_for("valve-2"), 0.95);
        assert_eq!(decision.reason, "Auto-activation disabled");
    }

    #[test]
    fn test_confidence_threshold() {
        let settings = permissive();
        let decision = evaluate(ctx(&settings, 0), &rule_for("valve-2"), 0.5);
        assert_eq!(decision.reason, "Confidence 0.50 below threshold 0.8");
        assert!(!decision.can_auto_activate);

        assert!(evaluate(ctx(&settings, 0), &rule_for("valve-2"), 0.8).can_auto_activate);
    }

    #[test]
    fn test_daily_limit() {
        let settings = permissive();
        let decision = evaluate(ctx(&settings, 3), &rule_for("valve-2"), 0.9);
        assert_eq!(decision.reason, "Daily change limit (3) reached");
        assert!(evaluate(ctx(&settings, 2), &rule_for("valve-2"), 0.9).can_auto_activate);
    }

    #[test]
    fn test_protected_device() {
        let settings = permissive();
        let decision = evaluate(ctx(&settings, 0), &rule_for("pump-1"), 0.9);
        assert_eq!(decision.reason, "Device pump-1 is protected");
    }

    #[test]
    fn test_rule_without_device_passes() {
        let settings = permissive();
        let decision = evaluate(ctx(&settings, 0), &json!({"action": {"notify": true}}), 0.9);
        assert_eq!(decision, GateDecision::approve());
        assert_eq!(decision.reason, "Approved for auto-activation");
    }

    #[test]
    fn test_start_of_day() {
        let now = DateTime::parse_from_rfc3339("2025-06-03T17:45:12Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(start_of_day(now).to_rfc3339(), "2025-06-03T00:00:00+00:00");
    }
}
