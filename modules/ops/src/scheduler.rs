//! Scheduled sweeps
//!
//! - Daily assessment: request a snapshot from every active camera of every
//!   active tenant. Enumeration is cross-tenant, so it runs under
//!   `with_admin`.
//! - Retention: per tenant, inside `with_tenant`, delete rows older than the
//!   tenant's retention settings, then delete their objects by key once the
//!   row deletion has committed.

use blob_storage::ObjectStore;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use event_bus::{subjects, EventPublisher};
use futures::FutureExt;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::future::Future;
use std::sync::Arc;
use tenant_context::{with_admin, with_tenant};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GovernanceError, GovernanceResult};
use crate::events::SnapshotRequestedData;

#[derive(Debug, Clone, FromRow)]
struct ActiveCamera {
    tenant_id: Uuid,
    camera_id: Uuid,
}

/// Publish `ops.snapshot.requested` for every active camera. Returns how
/// many requests went out.
pub async fn run_daily_assessment(pool: &PgPool, publisher: &EventPublisher) -> GovernanceResult<usize> {
    let cameras: Vec<ActiveCamera> = with_admin(pool, |conn| {
        async move {
            let rows = sqlx::query_as::<_, ActiveCamera>(
                r#"
                SELECT c.tenant_id, c.id AS camera_id
                FROM cameras c
                JOIN tenants t ON t.id = c.tenant_id
                WHERE t.status = 'active' AND c.status = 'active'
                ORDER BY c.tenant_id, c.id
                "#,
            )
            .fetch_all(&mut *conn)
            .await?;
            Ok::<_, GovernanceError>(rows)
        }
        .boxed()
    })
    .await?;

    let mut published = 0;
    for camera in &cameras {
        let data = SnapshotRequestedData {
            camera_id: camera.camera_id,
            reason: "scheduled".to_string(),
            job: "daily_assessment".to_string(),
        };
        match publisher
            .publish(subjects::SNAPSHOT_REQUESTED, camera.tenant_id, data, None)
            .await
        {
            Ok(_) => published += 1,
            Err(e) => tracing::warn!(
                tenant_id = %camera.tenant_id,
                camera_id = %camera.camera_id,
                error = %e,
                "Failed to request scheduled snapshot"
            ),
        }
    }

    tracing::info!(cameras = cameras.len(), published, "Daily assessment sweep finished");
    Ok(published)
}

#[derive(Debug, Clone, FromRow)]
struct RetentionPolicy {
    tenant_id: Uuid,
    retention_snapshots_days: i32,
    retention_annotated_days: i32,
    retention_reports_days: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSummary {
    pub tenants: usize,
    pub snapshots: usize,
    pub annotated: usize,
    pub reports: usize,
    pub object_failures: usize,
}

#[derive(Debug, Default)]
struct ExpiredRows {
    snapshot_keys: Vec<String>,
    annotated_keys: Vec<String>,
    report_keys: Vec<Option<String>>,
}

fn cutoff(now: DateTime<Utc>, days: i32) -> DateTime<Utc> {
    now - Duration::days(i64::from(days))
}

async fn expire_tenant_rows(
    pool: &PgPool,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> GovernanceResult<ExpiredRows> {
    let tenant_id = policy.tenant_id;
    let snapshots_before = cutoff(now, policy.retention_snapshots_days);
    let annotated_before = cutoff(now, policy.retention_annotated_days);
    let reports_before = cutoff(now, policy.retention_reports_days);

    with_tenant(pool, tenant_id, move |conn| {
        async move {
            // Annotated media first; detections go with their snapshot below.
            let annotated_keys: Vec<String> = sqlx::query_scalar(
                r#"
                WITH expired AS (
                    SELECT d.id, d.annotated_key
                    FROM detections d
                    JOIN snapshots s ON s.id = d.snapshot_id
                    WHERE d.tenant_id = $1
                      AND d.annotated_key IS NOT NULL
                      AND (d.created_at < $2 OR s.captured_at < $3)
                    FOR UPDATE OF d
                )
                UPDATE detections d
                SET annotated_key = NULL
                FROM expired e
                WHERE d.id = e.id
                RETURNING e.annotated_key
                "#,
            )
            .bind(tenant_id)
            .bind(annotated_before)
            .bind(snapshots_before)
            .fetch_all(&mut *conn)
            .await?;

            let snapshot_keys: Vec<String> = sqlx::query_scalar(
                "DELETE FROM snapshots WHERE tenant_id = $1 AND captured_at < $2 RETURNING object_key",
            )
            .bind(tenant_id)
            .bind(snapshots_before)
            .fetch_all(&mut *conn)
            .await?;

            let report_keys: Vec<Option<String>> = sqlx::query_scalar(
                "DELETE FROM reports WHERE tenant_id = $1 AND created_at < $2 RETURNING artifact_key",
            )
            .bind(tenant_id)
            .bind(reports_before)
            .fetch_all(&mut *conn)
            .await?;

            Ok::<_, GovernanceError>(ExpiredRows {
                snapshot_keys,
                annotated_keys,
                report_keys,
            })
        }
        .boxed()
    })
    .await
}

/// Apply every tenant's retention settings as of `now`.
pub async fn run_retention_sweep(
    pool: &PgPool,
    objects: &dyn ObjectStore,
    now: DateTime<Utc>,
) -> GovernanceResult<RetentionSummary> {
    let policies: Vec<RetentionPolicy> = with_admin(pool, |conn| {
        async move {
            let rows = sqlx::query_as::<_, RetentionPolicy>(
                r#"
                SELECT s.tenant_id, s.retention_snapshots_days, s.retention_annotated_days,
                       s.retention_reports_days
                FROM tenant_settings s
                JOIN tenants t ON t.id = s.tenant_id
                WHERE t.status = 'active'
                "#,
            )
            .fetch_all(&mut *conn)
            .await?;
            Ok::<_, GovernanceError>(rows)
        }
        .boxed()
    })
    .await?;

    let mut summary = RetentionSummary::default();
    for policy in policies {
        let tenant_id = policy.tenant_id;
        let expired = match expire_tenant_rows(pool, policy, now).await {
            Ok(expired) => expired,
            Err(e) => {
                tracing::error!(tenant_id = %tenant_id, error = %e, "Retention sweep failed for tenant");
                continue;
            }
        };

        summary.tenants += 1;
        summary.snapshots += expired.snapshot_keys.len();
        summary.annotated += expired.annotated_keys.len();
        summary.reports += expired.report_keys.len();

        let keys = expired
            .snapshot_keys
            .iter()
            .chain(expired.annotated_keys.iter())
            .chain(expired.report_keys.iter().flatten());
        for key in keys {
            if let Err(e) = objects.delete(key).await {
                summary.object_failures += 1;
                tracing::warn!(tenant_id = %tenant_id, key = %key, error = %e, "Failed to delete expired object");
            }
        }
    }

    tracing::info!(
        tenants = summary.tenants,
        snapshots = summary.snapshots,
        annotated = summary.annotated,
        reports = summary.reports,
        object_failures = summary.object_failures,
        "Retention sweep finished"
    );
    Ok(summary)
}

/// Next `hour:00` UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour % 24, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Run `job` every day at `hour:00` UTC.
pub fn spawn_daily<F, Fut>(name: &'static str, hour: u32, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let span = tracing::info_span!("scheduled_job", job = name, hour);
    tokio::spawn(
        async move {
            loop {
                let now = Utc::now();
                let next = next_run_after(now, hour);
                tracing::debug!(next_run = %next, "Waiting for next run");
                tokio::time::sleep((next - now).to_std().unwrap_or_default()).await;
                job().await;
            }
        }
        .instrument(span),
    )
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub assessment_hour: u32,
    pub retention_hour: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            assessment_hour: 8,
            retention_hour: 2,
        }
    }
}

/// Start both sweeps.
pub fn start_scheduler(
    pool: PgPool,
    publisher: EventPublisher,
    objects: Arc<dyn ObjectStore>,
    config: ScheduleConfig,
) -> Vec<JoinHandle<()>> {
    let assessment_pool = pool.clone();
    let assessment = spawn_daily("daily_assessment", config.assessment_hour, move || {
        let pool = assessment_pool.clone();
        let publisher = publisher.clone();
        async move {
            if let Err(e) = run_daily_assessment(&pool, &publisher).await {
                tracing::error!(error = %e, "Daily assessment sweep failed");
            }
        }
    });

    let retention = spawn_daily("retention_cleanup", config.retention_hour, move || {
        let pool = pool.clone();
        let objects = objects.clone();
        async move {
            if let Err(e) = run_retention_sweep(&pool, objects.as_ref(), Utc::now()).await {
                tracing::error!(error = %e, "Retention sweep failed");
            }
        }
    });

    tracing::info!(
        assessment_hour = config.assessment_hour,
        retention_hour = config.retention_hour,
        "Scheduler started"
    );
    vec![assessment, retention]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_run_later_today() {
        assert_eq!(
            next_run_after(at("2025-06-03T06:15:00Z"), 8),
            at("2025-06-03T08:00:00Z")
        );
    }

    #[test]
    fn test_next_run_rolls_to_tomorrow() {
        assert_eq!(
            next_run_after(at("2025-06-03T08:00:00Z"), 8),
            at("2025-06-04T08:00:00Z")
        );
        assert_eq!(
            next_run_after(at("2025-06-30T23:59:00Z"), 2),
            at("2025-07-01T02:00:00Z")
        );
    }

    #[test]
    fn test_cutoff() {
        assert_eq!(cutoff(at("2025-06-30T00:00:00Z"), 30), at("2025-05-31T00:00:00Z"));
    }
}
