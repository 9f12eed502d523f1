//! Governance service
//!
//! Wraps a [`GovernanceStore`] and announces committed changes on the bus.
//! Events go out only after the store's unit of work has committed; a
//! publish failure at that point is logged and does not undo the change.

use chrono::Utc;
use event_bus::{subjects, EventPublisher};
use platform_audit::{AuditEntry, AuditFilter};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};
use crate::events::{RuleActivatedData, RuleProposedData};
use crate::models::{
    AiSettingsUpdate, NewProposal, ProposalAction, RetentionSettingsUpdate, RuleProposal,
    TenantSettings, TransitionContext,
};
use crate::policy_gate::GateDecision;
use crate::repos::GovernanceStore;

#[derive(Clone)]
pub struct GovernanceService {
    store: Arc<dyn GovernanceStore>,
    publisher: EventPublisher,
}

impl GovernanceService {
    pub fn new(store: Arc<dyn GovernanceStore>, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub async fn evaluate(
        &self,
        tenant_id: Uuid,
        proposed_rule: &Value,
        confidence: f64,
    ) -> GovernanceResult<GateDecision> {
        self.store
            .evaluate(tenant_id, proposed_rule, confidence, Utc::now())
            .await
    }

    pub async fn create_proposal(
        &self,
        draft: NewProposal,
    ) -> GovernanceResult<(RuleProposal, GateDecision)> {
        let (proposal, decision) = self.store.create_proposal(&draft, Utc::now()).await?;

        tracing::info!(
            tenant_id = %proposal.tenant_id,
            proposal_id = %proposal.id,
            status = %proposal.status,
            reason = %decision.reason,
            "Rule proposal created"
        );

        self.announce(
            subjects::RULE_PROPOSED,
            proposal.tenant_id,
            RuleProposedData::from(&proposal),
            draft.correlation_id,
        )
        .await;
        Ok((proposal, decision))
    }

    pub async fn approve_proposal(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        ctx: TransitionContext,
    ) -> GovernanceResult<RuleProposal> {
        self.transition(tenant_id, id, ProposalAction::Approve, ctx).await
    }

    pub async fn reject_proposal(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        ctx: TransitionContext,
    ) -> GovernanceResult<RuleProposal> {
        self.transition(tenant_id, id, ProposalAction::Reject, ctx).await
    }

    pub async fn activate_proposal(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        ctx: TransitionContext,
    ) -> GovernanceResult<RuleProposal> {
        let correlation_id = ctx.correlation_id;
        let proposal = self
            .transition(tenant_id, id, ProposalAction::Activate, ctx)
            .await?;

        self.announce(
            subjects::RULE_ACTIVATED,
            tenant_id,
            RuleActivatedData::from(&proposal),
            correlation_id,
        )
        .await;
        Ok(proposal)
    }

    pub async fn get_proposal(&self, tenant_id: Uuid, id: Uuid) -> GovernanceResult<RuleProposal> {
        self.store
            .get_proposal(tenant_id, id)
            .await?
            .ok_or(GovernanceError::ProposalNotFound(id))
    }

    pub async fn get_settings(&self, tenant_id: Uuid) -> GovernanceResult<TenantSettings> {
        self.store
            .get_settings(tenant_id)
            .await?
            .ok_or(GovernanceError::SettingsNotFound(tenant_id))
    }

    pub async fn update_ai_settings(
        &self,
        tenant_id: Uuid,
        update: AiSettingsUpdate,
        actor_id: Option<String>,
    ) -> GovernanceResult<TenantSettings> {
        let settings = self
            .store
            .update_ai_settings(tenant_id, &update, actor_id, Utc::now())
            .await?;
        tracing::info!(tenant_id = %tenant_id, "AI governance settings updated");
        Ok(settings)
    }

    pub async fn update_retention_settings(
        &self,
        tenant_id: Uuid,
        update: RetentionSettingsUpdate,
        actor_id: Option<String>,
    ) -> GovernanceResult<TenantSettings> {
        let settings = self
            .store
            .update_retention_settings(tenant_id, &update, actor_id, Utc::now())
            .await?;
        tracing::info!(tenant_id = %tenant_id, "Retention settings updated");
        Ok(settings)
    }

    pub async fn list_audit(
        &self,
        tenant_id: Uuid,
        filter: &AuditFilter,
    ) -> GovernanceResult<Vec<AuditEntry>> {
        self.store.list_audit(tenant_id, filter).await
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        action: ProposalAction,
        ctx: TransitionContext,
    ) -> GovernanceResult<RuleProposal> {
        let proposal = self
            .store
            .transition(tenant_id, id, action, &ctx, Utc::now())
            .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            proposal_id = %id,
            status = %proposal.status,
            actor_id = ?ctx.actor_id,
            "Rule proposal transitioned"
        );
        Ok(proposal)
    }

    async fn announce<T: Serialize>(
        &self,
        subject: &str,
        tenant_id: Uuid,
        data: T,
        correlation_id: Option<Uuid>,
    ) {
        if let Err(e) = self
            .publisher
            .publish(subject, tenant_id, data, correlation_id)
            .await
        {
            tracing::error!(
                subject = %subject,
                tenant_id = %tenant_id,
                error = %e,
                "Failed to publish governance event after commit"
            );
        }
    }
}
