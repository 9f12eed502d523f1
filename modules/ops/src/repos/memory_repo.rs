//! In-process governance store for tests and database-less runs.
//!
//! One mutex guards settings and proposals, so each method is atomic with
//! respect to the others, mirroring the transactional store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use platform_audit::{actions, AuditEntry, AuditFilter, MemoryAuditLog};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    build_proposal, proposal_audit, rejected_transition, settings_audit, transition_audit,
    validate_draft, GovernanceStore,
};
use crate::error::{GovernanceError, GovernanceResult};
use crate::models::{
    AiSettingsUpdate, NewProposal, ProposalAction, RetentionSettingsUpdate, RuleProposal,
    RuleStatus, TenantSettings, TransitionContext,
};
use crate::policy_gate::{self, start_of_day, GateContext, GateDecision};

#[derive(Debug, Default)]
struct State {
    settings: HashMap<Uuid, TenantSettings>,
    proposals: HashMap<Uuid, RuleProposal>,
}

impl State {
    fn gate(&self, tenant_id: Uuid, rule: &Value, confidence: f64, now: DateTime<Utc>) -> GateDecision {
        let since = start_of_day(now);
        let activated_today = self
            .proposals
            .values()
            .filter(|p| {
                p.tenant_id == tenant_id
                    && p.status == RuleStatus::Activated
                    && p.approved_at.is_some_and(|at| at >= since)
            })
            .count();
        policy_gate::evaluate(
            GateContext {
                settings: self.settings.get(&tenant_id),
                activated_today: i64::try_from(activated_today).unwrap_or(i64::MAX),
            },
            rule,
            confidence,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGovernanceStore {
    state: Arc<Mutex<State>>,
    audit: MemoryAuditLog,
}

impl MemoryGovernanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision or replace a tenant's settings.
    pub fn put_settings(&self, settings: TenantSettings) {
        self.lock().settings.insert(settings.tenant_id, settings);
    }

    pub fn audit_log(&self) -> &MemoryAuditLog {
        &self.audit
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl GovernanceStore for MemoryGovernanceStore {
    async fn get_settings(&self, tenant_id: Uuid) -> GovernanceResult<Option<TenantSettings>> {
        Ok(self.lock().settings.get(&tenant_id).cloned())
    }

    async fn get_proposal(&self, tenant_id: Uuid, id: Uuid) -> GovernanceResult<Option<RuleProposal>> {
        Ok(self
            .lock()
            .proposals
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn evaluate(
        &self,
        tenant_id: Uuid,
        proposed_rule: &Value,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> GovernanceResult<GateDecision> {
        Ok(self.lock().gate(tenant_id, proposed_rule, confidence, now))
    }

    async fn create_proposal(
        &self,
        draft: &NewProposal,
        now: DateTime<Utc>,
    ) -> GovernanceResult<(RuleProposal, GateDecision)> {
        validate_draft(draft)?;

        let mut state = self.lock();
        let decision = state.gate(draft.tenant_id, &draft.proposed_rule, draft.confidence, now);
        let proposal = build_proposal(draft, &decision, now);

        self.audit
            .append(proposal_audit(&proposal, &decision, draft.correlation_id));
        state.proposals.insert(proposal.id, proposal.clone());
        Ok((proposal, decision))
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        action: ProposalAction,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RuleProposal> {
        let mut state = self.lock();
        let proposal = state
            .proposals
            .get_mut(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or(GovernanceError::ProposalNotFound(id))?;

        if proposal.status != action.from_status() {
            return Err(rejected_transition(action, proposal.status));
        }

        proposal.status = action.to_status();
        match action {
            ProposalAction::Approve => proposal.approved_at = Some(now),
            ProposalAction::Activate => proposal.activated_at = Some(now),
            ProposalAction::Reject => {}
        }

        let updated = proposal.clone();
        self.audit.append(transition_audit(&updated, action, ctx));
        Ok(updated)
    }

    async fn update_ai_settings(
        &self,
        tenant_id: Uuid,
        update: &AiSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings> {
        update.validate().map_err(GovernanceError::Validation)?;

        let mut state = self.lock();
        let settings = state
            .settings
            .get_mut(&tenant_id)
            .ok_or(GovernanceError::SettingsNotFound(tenant_id))?;

        let before = settings.ai_snapshot();
        update.apply(settings);
        settings.updated_at = now;

        self.audit.append(settings_audit(
            tenant_id,
            actions::AI_SETTINGS_UPDATED,
            actor_id,
            before,
            settings.ai_snapshot(),
        ));
        Ok(settings.clone())
    }

    async fn update_retention_settings(
        &self,
        tenant_id: Uuid,
        update: &RetentionSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings> {
        update.validate().map_err(GovernanceError::Validation)?;

        let mut state = self.lock();
        let settings = state
            .settings
            .get_mut(&tenant_id)
            .ok_or(GovernanceError::SettingsNotFound(tenant_id))?;

        let before = settings.retention_snapshot();
        update.apply(settings);
        settings.updated_at = now;

        self.audit.append(settings_audit(
            tenant_id,
            actions::RETENTION_SETTINGS_UPDATED,
            actor_id,
            before,
            settings.retention_snapshot(),
        ));
        Ok(settings.clone())
    }

    async fn list_audit(&self, tenant_id: Uuid, filter: &AuditFilter) -> GovernanceResult<Vec<AuditEntry>> {
        Ok(self.audit.list(tenant_id, filter))
    }
}
