use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Tenant policy for AI-created rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ai_rule_creation", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AiRuleCreation {
    SuggestOnly,
    Allow,
}

/// `pending → {approved, rejected}`, `approved → activated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rule_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pending,
    Approved,
    Rejected,
    Activated,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Pending => "pending",
            RuleStatus::Approved => "approved",
            RuleStatus::Rejected => "rejected",
            RuleStatus::Activated => "activated",
        }
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "rule_creator", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RuleCreator {
    Ai,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantSettings {
    pub tenant_id: Uuid,
    pub ai_rule_creation: AiRuleCreation,
    pub ai_auto_activation: bool,
    pub max_daily_rule_changes: i32,
    pub protected_devices: Vec<String>,
    pub protected_rules: Vec<String>,
    pub retention_snapshots_days: i32,
    pub retention_annotated_days: i32,
    pub retention_reports_days: i32,
    pub updated_at: DateTime<Utc>,
}

impl TenantSettings {
    /// Defaults a freshly provisioned tenant starts with.
    pub fn defaults(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            ai_rule_creation: AiRuleCreation::SuggestOnly,
            ai_auto_activation: false,
            max_daily_rule_changes: 3,
            protected_devices: Vec::new(),
            protected_rules: Vec::new(),
            retention_snapshots_days: 30,
            retention_annotated_days: 90,
            retention_reports_days: 90,
            updated_at: Utc::now(),
        }
    }

    pub fn ai_snapshot(&self) -> Value {
        json!({
            "ai_rule_creation": self.ai_rule_creation,
            "ai_auto_activation": self.ai_auto_activation,
            "max_daily_rule_changes": self.max_daily_rule_changes,
            "protected_devices": self.protected_devices,
        })
    }

    pub fn retention_snapshot(&self) -> Value {
        json!({
            "retention_snapshots_days": self.retention_snapshots_days,
            "retention_annotated_days": self.retention_annotated_days,
            "retention_reports_days": self.retention_reports_days,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RuleProposal {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub intent_type: String,
    pub proposed_rule: Value,
    pub confidence: f64,
    pub requires_approval: bool,
    pub status: RuleStatus,
    pub created_by: RuleCreator,
    pub actor_id: Option<String>,
    pub tb_rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// Input to `create_proposal`.
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub tenant_id: Uuid,
    pub intent_type: String,
    pub proposed_rule: Value,
    pub confidence: f64,
    /// `None` or `"ai"` marks an AI-originated proposal.
    pub actor_id: Option<String>,
    pub tb_rule_id: Option<String>,
    pub correlation_id: Option<Uuid>,
}

impl NewProposal {
    pub fn created_by(&self) -> RuleCreator {
        match self.actor_id.as_deref() {
            None | Some("ai") => RuleCreator::Ai,
            Some(_) => RuleCreator::User,
        }
    }
}

/// Manual transitions out of `pending` and `approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalAction {
    Approve,
    Reject,
    Activate,
}

impl ProposalAction {
    pub fn from_status(&self) -> RuleStatus {
        match self {
            ProposalAction::Approve | ProposalAction::Reject => RuleStatus::Pending,
            ProposalAction::Activate => RuleStatus::Approved,
        }
    }

    pub fn to_status(&self) -> RuleStatus {
        match self {
            ProposalAction::Approve => RuleStatus::Approved,
            ProposalAction::Reject => RuleStatus::Rejected,
            ProposalAction::Activate => RuleStatus::Activated,
        }
    }

    pub fn audit_action(&self) -> &'static str {
        use platform_audit::actions;
        match self {
            ProposalAction::Approve => actions::RULE_APPROVED,
            ProposalAction::Reject => actions::RULE_REJECTED,
            ProposalAction::Activate => actions::RULE_ACTIVATED,
        }
    }
}

/// Who performed a transition and why.
#[derive(Debug, Clone, Default)]
pub struct TransitionContext {
    pub actor_id: Option<String>,
    pub reason: Option<String>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiSettingsUpdate {
    pub ai_rule_creation: Option<AiRuleCreation>,
    pub ai_auto_activation: Option<bool>,
    pub max_daily_rule_changes: Option<i32>,
    pub protected_devices: Option<Vec<String>>,
}

impl AiSettingsUpdate {
    pub fn apply(&self, settings: &mut TenantSettings) {
        if let Some(v) = self.ai_rule_creation {
            settings.ai_rule_creation = v;
        }
        if let Some(v) = self.ai_auto_activation {
            settings.ai_auto_activation = v;
        }
        if let Some(v) = self.max_daily_rule_changes {
            settings.max_daily_rule_changes = v;
        }
        if let Some(v) = &self.protected_devices {
            settings.protected_devices = v.clone();
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.max_daily_rule_changes {
            Some(n) if n < 0 => Err("max_daily_rule_changes must be >= 0".to_string()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionSettingsUpdate {
    pub retention_snapshots_days: Option<i32>,
    pub retention_annotated_days: Option<i32>,
    pub retention_reports_days: Option<i32>,
}

impl RetentionSettingsUpdate {
    pub fn apply(&self, settings: &mut TenantSettings) {
        if let Some(v) = self.retention_snapshots_days {
            settings.retention_snapshots_days = v;
        }
        if let Some(v) = self.retention_annotated_days {
            settings.retention_annotated_days = v;
        }
        if let Some(v) = self.retention_reports_days {
            settings.retention_reports_days = v;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let fields = [
            ("retention_snapshots_days", self.retention_snapshots_days),
            ("retention_annotated_days", self.retention_annotated_days),
            ("retention_reports_days", self.retention_reports_days),
        ];
        for (name, value) in fields {
            if matches!(value, Some(days) if days < 1) {
                return Err(format!("{} must be at least 1", name));
            }
        }
        Ok(())
    }
}
