use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod actions {
    pub const RULE_PROPOSED: &str = "rule_proposed";
    pub const RULE_APPROVED: &str = "rule_approved";
    pub const RULE_REJECTED: &str = "rule_rejected";
    pub const RULE_ACTIVATED: &str = "rule_activated";
    pub const AI_SETTINGS_UPDATED: &str = "settings.ai.updated";
    pub const RETENTION_SETTINGS_UPDATED: &str = "settings.retention.updated";
}

pub mod targets {
    pub const RULE_PROPOSAL: &str = "rule_proposal";
    pub const TENANT_SETTINGS: &str = "tenant_settings";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "actor_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    User,
    Ai,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub actor_type: ActorType,
    pub actor_id: Option<String>,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

impl AuditEntry {
    pub fn new(
        tenant_id: Uuid,
        actor_type: ActorType,
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl ToString,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            actor_type,
            actor_id: None,
            action: action.into(),
            target_type: target_type.into(),
            target_id: target_id.to_string(),
            reason: None,
            confidence: None,
            before: None,
            after: None,
            occurred_at: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_actor_id(mut self, actor_id: Option<String>) -> Self {
        self.actor_id = actor_id;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_change(
        mut self,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

/// Query filters for reading the trail back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.as_deref().map_or(true, |a| a == entry.action)
            && self
                .target_type
                .as_deref()
                .map_or(true, |t| t == entry.target_type)
            && self.since.map_or(true, |s| entry.occurred_at >= s)
    }
}
