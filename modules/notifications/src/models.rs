use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// INCOMING EVENT PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Payload for vision.assessment.created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentCreatedPayload {
    pub camera_id: String,
    /// Primary finding; the first hypothesis stands in when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub severity: Severity,
    pub confidence: f64,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
}

impl AssessmentCreatedPayload {
    pub fn alert_label(&self) -> &str {
        self.label
            .as_deref()
            .or_else(|| self.hypotheses.first().map(|h| h.name.as_str()))
            .unwrap_or("unknown")
    }

    /// Cooldown key: one alert per camera and finding per window
    pub fn cooldown_target(&self) -> String {
        format!("{}:{}", self.camera_id, self.alert_label())
    }
}

/// Payload for ops.rule.proposed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleProposedPayload {
    pub proposal_id: Uuid,
    pub intent_type: String,
    pub confidence: f64,
    pub requires_approval: bool,
}

// ============================================================================
// OUTGOING EVENT PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warn,
    Critical,
}

/// Payload for notify.telegram.outbound
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub level: AlertLevel,
    pub title: String,
    pub message: String,
    pub source_subject: String,
}
