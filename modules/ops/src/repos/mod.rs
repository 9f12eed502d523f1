//! Governance persistence
//!
//! Each store method is one unit of work: the mutation and its audit entry
//! commit together or not at all.

pub mod governance_repo;
pub mod memory_repo;

pub use governance_repo::PgGovernanceStore;
pub use memory_repo::MemoryGovernanceStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_audit::{actions, targets, ActorType, AuditEntry, AuditFilter};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{
    AiSettingsUpdate, NewProposal, ProposalAction, RetentionSettingsUpdate, RuleCreator,
    RuleProposal, RuleStatus, TenantSettings, TransitionContext,
};
use crate::policy_gate::GateDecision;

#[async_trait]
pub trait GovernanceStore: Send + Sync {
    async fn get_settings(&self, tenant_id: Uuid) -> GovernanceResult<Option<TenantSettings>>;

    async fn get_proposal(&self, tenant_id: Uuid, id: Uuid) -> GovernanceResult<Option<RuleProposal>>;

    /// Run the policy gate against current settings and today's activations.
    async fn evaluate(
        &self,
        tenant_id: Uuid,
        proposed_rule: &Value,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> GovernanceResult<GateDecision>;

    /// Evaluate, insert, and audit in one unit of work.
    async fn create_proposal(
        &self,
        draft: &NewProposal,
        now: DateTime<Utc>,
    ) -> GovernanceResult<(RuleProposal, GateDecision)>;

    /// Compare-and-set one status edge and audit it.
    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        action: ProposalAction,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RuleProposal>;

    async fn update_ai_settings(
        &self,
        tenant_id: Uuid,
        update: &AiSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings>;

    async fn update_retention_settings(
        &self,
        tenant_id: Uuid,
        update: &RetentionSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings>;

    async fn list_audit(&self, tenant_id: Uuid, filter: &AuditFilter) -> GovernanceResult<Vec<AuditEntry>>;
}

pub(crate) fn build_proposal(
    draft: &NewProposal,
    decision: &GateDecision,
    now: DateTime<Utc>,
) -> RuleProposal {
    let status = if decision.can_auto_activate {
        RuleStatus::Approved
    } else {
        RuleStatus::Pending
    };
    RuleProposal {
        id: Uuid::new_v4(),
        tenant_id: draft.tenant_id,
        intent_type: draft.intent_type.clone(),
        proposed_rule: draft.proposed_rule.clone(),
        confidence: draft.confidence,
        requires_approval: !decision.can_auto_activate,
        status,
        created_by: draft.created_by(),
        actor_id: draft.actor_id.clone(),
        tb_rule_id: draft.tb_rule_id.clone(),
        created_at: now,
        // Auto-approved proposals count toward the daily change limit once activated.
        approved_at: decision.can_auto_activate.then_some(now),
        activated_at: None,
    }
}

pub(crate) fn proposal_audit(
    proposal: &RuleProposal,
    decision: &GateDecision,
    correlation_id: Option<Uuid>,
) -> AuditEntry {
    let actor_type = match proposal.created_by {
        RuleCreator::Ai => ActorType::Ai,
        RuleCreator::User => ActorType::User,
    };
    AuditEntry::new(
        proposal.tenant_id,
        actor_type,
        actions::RULE_PROPOSED,
        targets::RULE_PROPOSAL,
        proposal.id,
    )
    .with_actor_id(Some(proposal.actor_id.clone().unwrap_or_else(|| "ai".to_string())))
    .with_reason(decision.reason.clone())
    .with_confidence(proposal.confidence)
    .with_change(
        None,
        Some(json!({"proposal": proposal.proposed_rule, "status": proposal.status})),
    )
    .with_correlation_id(correlation_id)
}

pub(crate) fn transition_audit(
    proposal: &RuleProposal,
    action: ProposalAction,
    ctx: &TransitionContext,
) -> AuditEntry {
    let actor_type = if ctx.actor_id.is_some() {
        ActorType::User
    } else {
        ActorType::System
    };
    let mut entry = AuditEntry::new(
        proposal.tenant_id,
        actor_type,
        action.audit_action(),
        targets::RULE_PROPOSAL,
        proposal.id,
    )
    .with_actor_id(ctx.actor_id.clone())
    .with_change(
        Some(json!({"status": action.from_status()})),
        Some(json!({"status": action.to_status()})),
    )
    .with_correlation_id(ctx.correlation_id);
    if let Some(reason) = &ctx.reason {
        entry = entry.with_reason(reason.clone());
    }
    entry
}

pub(crate) fn settings_audit(
    tenant_id: Uuid,
    action: &str,
    actor_id: Option<String>,
    before: Value,
    after: Value,
) -> AuditEntry {
    AuditEntry::new(
        tenant_id,
        ActorType::User,
        action,
        targets::TENANT_SETTINGS,
        tenant_id,
    )
    .with_actor_id(actor_id)
    .with_change(Some(before), Some(after))
}

/// Why `action` cannot apply to a proposal currently in `current`.
///
/// Only a pending proposal that someone tries to activate is "not approved";
/// everything else has already been decided.
pub(crate) fn rejected_transition(action: ProposalAction, current: RuleStatus) -> GovernanceError {
    match (action, current) {
        (ProposalAction::Activate, RuleStatus::Pending) => GovernanceError::NotApproved(current),
        _ => GovernanceError::AlreadyDecided(current),
    }
}

pub(crate) fn validate_draft(draft: &NewProposal) -> GovernanceResult<()> {
    if draft.intent_type.trim().is_empty() {
        return Err(GovernanceError::Validation("intent_type must not be empty".into()));
    }
    if !(0.0..=1.0).contains(&draft.confidence) || draft.confidence.is_nan() {
        return Err(GovernanceError::Validation(format!(
            "confidence must be within [0, 1], got {}",
            draft.confidence
        )));
    }
    if !draft.proposed_rule.is_object() {
        return Err(GovernanceError::Validation("proposed_rule must be a JSON object".into()));
    }
    Ok(())
}
