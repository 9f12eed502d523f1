use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::FutureExt;
use sqlx::{PgConnection, PgPool};
use tenant_context::with_tenant;
use uuid::Uuid;

use super::{lost_claim, Claim, JobStore};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{JobStatus, ReportJob};

const JOB_COLUMNS: &str = "id, tenant_id, kind, format, range_from, range_to, status, \
     artifact_key, error, created_at, claimed_at, completed_at";

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_job(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<Option<ReportJob>, sqlx::Error> {
    let sql = format!(
        "SELECT {} FROM reports WHERE id = $1 AND tenant_id = $2",
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ReportJob>(&sql)
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &ReportJob) -> PipelineResult<()> {
        let job = job.clone();
        with_tenant(&self.pool, job.tenant_id, move |conn| {
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO reports (id, tenant_id, kind, format, range_from, range_to, status, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(job.id)
                .bind(job.tenant_id)
                .bind(job.kind)
                .bind(job.format)
                .bind(job.range_from)
                .bind(job.range_to)
                .bind(job.status)
                .bind(job.created_at)
                .execute(&mut *conn)
                .await?;
                Ok::<_, PipelineError>(())
            }
            .boxed()
        })
        .await
    }

    async fn get(&self, tenant_id: Uuid, id: Uuid) -> PipelineResult<Option<ReportJob>> {
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move { Ok::<_, PipelineError>(fetch_job(conn, tenant_id, id).await?) }.boxed()
        })
        .await
    }

    async fn claim(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        now: DateTime<Utc>,
        stale_lease: Duration,
    ) -> PipelineResult<Claim> {
        let stale_before = now - stale_lease;
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                // Single statement: concurrent claimers serialize on the row lock
                // and re-check the predicate, so at most one sees a row back.
                let sql = format!(
                    r#"
                    UPDATE reports
                    SET status = 'processing', claimed_at = $3, error = NULL
                    WHERE id = $1 AND tenant_id = $2
                      AND (status IN ('queued', 'failed')
                           OR (status = 'processing' AND (claimed_at IS NULL OR claimed_at < $4)))
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                );
                let claimed = sqlx::query_as::<_, ReportJob>(&sql)
                    .bind(id)
                    .bind(tenant_id)
                    .bind(now)
                    .bind(stale_before)
                    .fetch_optional(&mut *conn)
                    .await?;

                if let Some(job) = claimed {
                    return Ok::<_, PipelineError>(Claim::Claimed(job));
                }

                let status: Option<JobStatus> =
                    sqlx::query_scalar("SELECT status FROM reports WHERE id = $1 AND tenant_id = $2")
                        .bind(id)
                        .bind(tenant_id)
                        .fetch_optional(&mut *conn)
                        .await?;
                Ok(status.map_or(Claim::Missing, lost_claim))
            }
            .boxed()
        })
        .await
    }

    async fn mark_ready(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        artifact_key: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let artifact_key = artifact_key.to_string();
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let result = sqlx::query(
                    r#"
                    UPDATE reports
                    SET status = 'ready', artifact_key = $3, error = NULL, completed_at = $4
                    WHERE id = $1 AND tenant_id = $2
                    "#,
                )
                .bind(id)
                .bind(tenant_id)
                .bind(&artifact_key)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(PipelineError::NotFound(id));
                }
                Ok::<_, PipelineError>(())
            }
            .boxed()
        })
        .await
    }

    async fn mark_failed(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let error = error.to_string();
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let result = sqlx::query(
                    r#"
                    UPDATE reports
                    SET status = 'failed', error = $3, completed_at = $4
                    WHERE id = $1 AND tenant_id = $2
                    "#,
                )
                .bind(id)
                .bind(tenant_id)
                .bind(&error)
                .bind(now)
                .execute(&mut *conn)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(PipelineError::NotFound(id));
                }
                Ok::<_, PipelineError>(())
            }
            .boxed()
        })
        .await
    }

    async fn abandon(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        claimed_at: Option<DateTime<Utc>>,
        error: &str,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool> {
        let error = error.to_string();
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let result = sqlx::query(
                    r#"
                    UPDATE reports
                    SET status = 'failed', error = $4, completed_at = $5
                    WHERE id = $1 AND tenant_id = $2
                      AND status = 'processing' AND claimed_at IS NOT DISTINCT FROM $3
                    "#,
                )
                .bind(id)
                .bind(tenant_id)
                .bind(claimed_at)
                .bind(&error)
                .bind(now)
                .execute(&mut *conn)
                .await?;
                Ok::<_, PipelineError>(result.rows_affected() > 0)
            }
            .boxed()
        })
        .await
    }
}
