//! Postgres governance store
//!
//! Every method runs inside `with_tenant`, so row-level security scopes
//! each statement on top of the explicit `tenant_id` filters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use platform_audit::{actions, AuditEntry, AuditFilter};
use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use tenant_context::with_tenant;
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

#[derive(Clone)]
pub struct PgGovernanceStore {
    pool: PgPool,
}

impl PgGovernanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const SETTINGS_COLUMNS: &str = "tenant_id, ai_rule_creation, ai_auto_activation, \
    max_daily_rule_changes, protected_devices, protected_rules, retention_snapshots_days, \
    retention_annotated_days, retention_reports_days, updated_at";

const PROPOSAL_COLUMNS: &str = "id, tenant_id, intent_type, proposed_rule, confidence, \
    requires_approval, status, created_by, actor_id, tb_rule_id, created_at, approved_at, \
    activated_at";

async fn fetch_settings(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    for_update: bool,
) -> Result<Option<TenantSettings>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM tenant_settings WHERE tenant_id = $1{}",
        SETTINGS_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, TenantSettings>(&sql)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
}

async fn count_activated_since(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM rule_proposals
        WHERE tenant_id = $1
          AND status = 'activated'
          AND approved_at >= $2
        "#,
    )
    .bind(tenant_id)
    .bind(since)
    .fetch_one(&mut *conn)
    .await
}

async fn gate(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    proposed_rule: &Value,
    confidence: f64,
    now: DateTime<Utc>,
) -> Result<GateDecision, sqlx::Error> {
    let settings = fetch_settings(conn, tenant_id, false).await?;
    let activated_today = match settings {
        Some(_) => count_activated_since(conn, tenant_id, start_of_day(now)).await?,
        None => 0,
    };
    Ok(policy_gate::evaluate(
        GateContext {
            settings: settings.as_ref(),
            activated_today,
        },
        proposed_rule,
        confidence,
    ))
}

async fn fetch_proposal(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<RuleProposal>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM rule_proposals WHERE id = $1 AND tenant_id = $2",
        PROPOSAL_COLUMNS
    );
    sqlx::query_as::<_, RuleProposal>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
}

async fn insert_proposal(conn: &mut PgConnection, p: &RuleProposal) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO rule_proposals (
            id, tenant_id, intent_type, proposed_rule, confidence, requires_approval,
            status, created_by, actor_id, tb_rule_id, created_at, approved_at, activated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(p.id)
    .bind(p.tenant_id)
    .bind(&p.intent_type)
    .bind(&p.proposed_rule)
    .bind(p.confidence)
    .bind(p.requires_approval)
    .bind(p.status)
    .bind(p.created_by)
    .bind(&p.actor_id)
    .bind(&p.tb_rule_id)
    .bind(p.created_at)
    .bind(p.approved_at)
    .bind(p.activated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Single-statement compare-and-set on `status`. `None` when the row is
/// missing or no longer in `from`.
async fn compare_and_set_status(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    id: Uuid,
    action: ProposalAction,
    now: DateTime<Utc>,
) -> Result<Option<RuleProposal>, sqlx::Error> {
    let to = action.to_status();
    let approved_at = (to == RuleStatus::Approved).then_some(now);
    let activated_at = (to == RuleStatus::Activated).then_some(now);

    let sql = format!(
        r#"
        UPDATE rule_proposals
        SET status = $4,
            approved_at = COALESCE($5, approved_at),
            activated_at = COALESCE($6, activated_at)
        WHERE id = $1 AND tenant_id = $2 AND status = $3
        RETURNING {}
        "#,
        PROPOSAL_COLUMNS
    );
    sqlx::query_as::<_, RuleProposal>(&sql)
        .bind(id)
        .bind(tenant_id)
        .bind(action.from_status())
        .bind(to)
        .bind(approved_at)
        .bind(activated_at)
        .fetch_optional(&mut *conn)
        .await
}

async fn save_settings(conn: &mut PgConnection, s: &TenantSettings) -> Result<TenantSettings, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE tenant_settings
        SET ai_rule_creation = $2,
            ai_auto_activation = $3,
            max_daily_rule_changes = $4,
            protected_devices = $5,
            retention_snapshots_days = $6,
            retention_annotated_days = $7,
            retention_reports_days = $8,
            updated_at = $9
        WHERE tenant_id = $1
        RETURNING {}
        "#,
        SETTINGS_COLUMNS
    );
    sqlx::query_as::<_, TenantSettings>(&sql)
        .bind(s.tenant_id)
        .bind(s.ai_rule_creation)
        .bind(s.ai_auto_activation)
        .bind(s.max_daily_rule_changes)
        .bind(&s.protected_devices)
        .bind(s.retention_snapshots_days)
        .bind(s.retention_annotated_days)
        .bind(s.retention_reports_days)
        .bind(s.updated_at)
        .fetch_one(&mut *conn)
        .await
}

/// Insert default settings for a tenant unless they already exist.
pub async fn ensure_settings(conn: &mut PgConnection, tenant_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO tenant_settings (tenant_id) VALUES ($1) ON CONFLICT (tenant_id) DO NOTHING")
        .bind(tenant_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl GovernanceStore for PgGovernanceStore {
    async fn get_settings(&self, tenant_id: Uuid) -> GovernanceResult<Option<TenantSettings>> {
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move { Ok::<_, GovernanceError>(fetch_settings(conn, tenant_id, false).await?) }.boxed()
        })
        .await
    }

    async fn get_proposal(&self, tenant_id: Uuid, id: Uuid) -> GovernanceResult<Option<RuleProposal>> {
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move { Ok::<_, GovernanceError>(fetch_proposal(conn, tenant_id, id).await?) }.boxed()
        })
        .await
    }

    async fn evaluate(
        &self,
        tenant_id: Uuid,
        proposed_rule: &Value,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> GovernanceResult<GateDecision> {
        let rule = proposed_rule.clone();
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move { Ok::<_, GovernanceError>(gate(conn, tenant_id, &rule, confidence, now).await?) }.boxed()
        })
        .await
    }

    async fn create_proposal(
        &self,
        draft: &NewProposal,
        now: DateTime<Utc>,
    ) -> GovernanceResult<(RuleProposal, GateDecision)> {
        validate_draft(draft)?;
        let draft = draft.clone();

        with_tenant(&self.pool, draft.tenant_id, move |conn| {
            async move {
                let decision =
                    gate(conn, draft.tenant_id, &draft.proposed_rule, draft.confidence, now).await?;
                let proposal = build_proposal(&draft, &decision, now);

                insert_proposal(conn, &proposal).await?;
                platform_audit::append(conn, &proposal_audit(&proposal, &decision, draft.correlation_id))
                    .await?;

                Ok::<_, GovernanceError>((proposal, decision))
            }
            .boxed()
        })
        .await
    }

    async fn transition(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        action: ProposalAction,
        ctx: &TransitionContext,
        now: DateTime<Utc>,
    ) -> GovernanceResult<RuleProposal> {
        let ctx = ctx.clone();

        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let Some(updated) = compare_and_set_status(conn, tenant_id, id, action, now).await?
                else {
                    return match fetch_proposal(conn, tenant_id, id).await? {
                        None => Err(GovernanceError::ProposalNotFound(id)),
                        Some(current) => Err(rejected_transition(action, current.status)),
                    };
                };

                platform_audit::append(conn, &transition_audit(&updated, action, &ctx)).await?;
                Ok::<_, GovernanceError>(updated)
            }
            .boxed()
        })
        .await
    }

    async fn update_ai_settings(
        &self,
        tenant_id: Uuid,
        update: &AiSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings> {
        update.validate().map_err(GovernanceError::Validation)?;
        let update = update.clone();

        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let mut settings = fetch_settings(conn, tenant_id, true)
                    .await?
                    .ok_or(GovernanceError::SettingsNotFound(tenant_id))?;
                let before = settings.ai_snapshot();

                update.apply(&mut settings);
                settings.updated_at = now;
                let saved = save_settings(conn, &settings).await?;

                let entry = settings_audit(
                    tenant_id,
                    actions::AI_SETTINGS_UPDATED,
                    actor_id,
                    before,
                    saved.ai_snapshot(),
                );
                platform_audit::append(conn, &entry).await?;
                Ok::<_, GovernanceError>(saved)
            }
            .boxed()
        })
        .await
    }

    async fn update_retention_settings(
        &self,
        tenant_id: Uuid,
        update: &RetentionSettingsUpdate,
        actor_id: Option<String>,
        now: DateTime<Utc>,
    ) -> GovernanceResult<TenantSettings> {
        update.validate().map_err(GovernanceError::Validation)?;
        let update = update.clone();

        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let mut settings = fetch_settings(conn, tenant_id, true)
                    .await?
                    .ok_or(GovernanceError::SettingsNotFound(tenant_id))?;
                let before = settings.retention_snapshot();

                update.apply(&mut settings);
                settings.updated_at = now;
                let saved = save_settings(conn, &settings).await?;

                let entry = settings_audit(
                    tenant_id,
                    actions::RETENTION_SETTINGS_UPDATED,
                    actor_id,
                    before,
                    saved.retention_snapshot(),
                );
                platform_audit::append(conn, &entry).await?;
                Ok::<_, GovernanceError>(saved)
            }
            .boxed()
        })
        .await
    }

    async fn list_audit(&self, tenant_id: Uuid, filter: &AuditFilter) -> GovernanceResult<Vec<AuditEntry>> {
        let filter = filter.clone();
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move { Ok::<_, GovernanceError>(platform_audit::list(conn, tenant_id, &filter).await?) }.boxed()
        })
        .await
    }
}
