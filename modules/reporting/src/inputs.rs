//! Read-only report inputs
//!
//! Everything a report shows is gathered through [`ReportInputs`] in one
//! tenant-scoped read before rendering starts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_context::with_tenant;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total_snapshots: i64,
    pub total_detections: i64,
    pub total_assessments: i64,
    pub open_tasks: i64,
    pub completed_tasks: i64,
}

/// Per-label detection statistics over the report range.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LabelStats {
    pub label: String,
    pub count: i64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportData {
    pub tenant_name: String,
    pub summary: ReportSummary,
    pub detections: Vec<LabelStats>,
}

#[async_trait]
pub trait ReportInputs: Send + Sync {
    async fn gather(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PipelineResult<ReportData>;
}

#[derive(Clone)]
pub struct PgReportInputs {
    pool: PgPool,
}

impl PgReportInputs {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportInputs for PgReportInputs {
    async fn gather(
        &self,
        tenant_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PipelineResult<ReportData> {
        with_tenant(&self.pool, tenant_id, move |conn| {
            async move {
                let tenant_name: Option<String> =
                    sqlx::query_scalar("SELECT name FROM tenants WHERE id = $1")
                        .bind(tenant_id)
                        .fetch_optional(&mut *conn)
                        .await?;

                let (total_snapshots, total_detections, total_assessments): (i64, i64, i64) =
                    sqlx::query_as(
                        r#"
                        SELECT
                            (SELECT COUNT(*) FROM snapshots
                              WHERE tenant_id = $1 AND captured_at >= $2 AND captured_at < $3),
                            (SELECT COUNT(*) FROM detections
                              WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3),
                            (SELECT COUNT(*) FROM assessments
                              WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3)
                        "#,
                    )
                    .bind(tenant_id)
                    .bind(from)
                    .bind(to)
                    .fetch_one(&mut *conn)
                    .await?;

                let (open_tasks, completed_tasks): (i64, i64) = sqlx::query_as(
                    r#"
                    SELECT
                        COUNT(*) FILTER (WHERE status = 'open' AND created_at < $3),
                        COUNT(*) FILTER (WHERE status = 'completed'
                                           AND completed_at >= $2 AND completed_at < $3)
                    FROM tasks
                    WHERE tenant_id = $1
                    "#,
                )
                .bind(tenant_id)
                .bind(from)
                .bind(to)
                .fetch_one(&mut *conn)
                .await?;

                let detections = sqlx::query_as::<_, LabelStats>(
                    r#"
                    SELECT label, COUNT(*) AS count, AVG(confidence)::float8 AS avg_confidence
                    FROM detections
                    WHERE tenant_id = $1 AND created_at >= $2 AND created_at < $3
                    GROUP BY label
                    ORDER BY count DESC, label
                    "#,
                )
                .bind(tenant_id)
                .bind(from)
                .bind(to)
                .fetch_all(&mut *conn)
                .await?;

                Ok::<_, PipelineError>(ReportData {
                    tenant_name: tenant_name.unwrap_or_else(|| "Unknown".to_string()),
                    summary: ReportSummary {
                        total_snapshots,
                        total_detections,
                        total_assessments,
                        open_tasks,
                        completed_tasks,
                    },
                    detections,
                })
            }
            .boxed()
        })
        .await
    }
}

/// Fixed inputs per tenant, for tests and database-less runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryReportInputs {
    data: Arc<Mutex<HashMap<Uuid, ReportData>>>,
    /// Simulated query latency
    delay: Option<Duration>,
}

impl MemoryReportInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set(&self, tenant_id: Uuid, data: ReportData) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant_id, data);
    }
}

#[async_trait]
impl ReportInputs for MemoryReportInputs {
    async fn gather(
        &self,
        tenant_id: Uuid,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> PipelineResult<ReportData> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}
