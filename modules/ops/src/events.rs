//! Payloads ops publishes on the bus.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{RuleProposal, RuleStatus};

pub const PRODUCER: &str = "afasa-ops";

/// `ops.rule.proposed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleProposedData {
    pub proposal_id: Uuid,
    pub intent_type: String,
    pub confidence: f64,
    pub requires_approval: bool,
    pub status: RuleStatus,
}

impl From<&RuleProposal> for RuleProposedData {
    fn from(p: &RuleProposal) -> Self {
        Self {
            proposal_id: p.id,
            intent_type: p.intent_type.clone(),
            confidence: p.confidence,
            requires_approval: p.requires_approval,
            status: p.status,
        }
    }
}

/// `ops.rule.activated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleActivatedData {
    pub proposal_id: Uuid,
    pub intent_type: String,
    pub tb_rule_id: Option<String>,
    pub proposed_rule: Value,
}

impl From<&RuleProposal> for RuleActivatedData {
    fn from(p: &RuleProposal) -> Self {
        Self {
            proposal_id: p.id,
            intent_type: p.intent_type.clone(),
            tb_rule_id: p.tb_rule_id.clone(),
            proposed_rule: p.proposed_rule.clone(),
        }
    }
}

/// `ops.snapshot.requested`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRequestedData {
    pub camera_id: Uuid,
    pub reason: String,
    pub job: String,
}
