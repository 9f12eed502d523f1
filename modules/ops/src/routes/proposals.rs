use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, AppState, Caller};
use crate::models::{NewProposal, RuleProposal, TransitionContext};
use crate::policy_gate::GateDecision;

#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub intent_type: String,
    pub proposed_rule: Value,
    pub confidence: f64,
    pub tb_rule_id: Option<String>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal: RuleProposal,
    pub decision: GateDecision,
}

#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    pub reason: Option<String>,
}

/// POST /api/ops/proposals
pub async fn create_proposal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(request): Json<CreateProposalRequest>,
) -> Result<(StatusCode, Json<ProposalResponse>), ApiError> {
    let draft = NewProposal {
        tenant_id: caller.tenant_id,
        intent_type: request.intent_type,
        proposed_rule: request.proposed_rule,
        confidence: request.confidence,
        actor_id: caller.user_id,
        tb_rule_id: request.tb_rule_id,
        correlation_id: request.correlation_id,
    };

    let (proposal, decision) = state.governance.create_proposal(draft).await?;
    Ok((StatusCode::CREATED, Json(ProposalResponse { proposal, decision })))
}

/// GET /api/ops/proposals/{id}
pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleProposal>, ApiError> {
    Ok(Json(state.governance.get_proposal(caller.tenant_id, id).await?))
}

fn context(caller: Caller, body: Option<Json<DecisionRequest>>) -> TransitionContext {
    TransitionContext {
        actor_id: caller.user_id,
        reason: body.and_then(|Json(b)| b.reason),
        correlation_id: None,
    }
}

/// POST /api/ops/proposals/{id}/approve
pub async fn approve_proposal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<RuleProposal>, ApiError> {
    let tenant_id = caller.tenant_id;
    let proposal = state
        .governance
        .approve_proposal(tenant_id, id, context(caller, body))
        .await?;
    Ok(Json(proposal))
}

/// POST /api/ops/proposals/{id}/reject
pub async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<DecisionRequest>>,
) -> Result<Json<RuleProposal>, ApiError> {
    let tenant_id = caller.tenant_id;
    let proposal = state
        .governance
        .reject_proposal(tenant_id, id, context(caller, body))
        .await?;
    Ok(Json(proposal))
}

/// POST /api/ops/proposals/{id}/activate
pub async fn activate_proposal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<RuleProposal>, ApiError> {
    let tenant_id = caller.tenant_id;
    let proposal = state
        .governance
        .activate_proposal(tenant_id, id, context(caller, None))
        .await?;
    Ok(Json(proposal))
}
