use sqlx::PgConnection;
use uuid::Uuid;

use crate::{AuditEntry, AuditError, AuditFilter};

/// Append one entry on the caller's connection (normally inside its transaction).
pub async fn append(conn: &mut PgConnection, entry: &AuditEntry) -> Result<(), AuditError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (
            id, tenant_id, actor_type, actor_id, action, target_type, target_id,
            reason, confidence, before, after, occurred_at, correlation_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(entry.id)
    .bind(entry.tenant_id)
    .bind(entry.actor_type)
    .bind(&entry.actor_id)
    .bind(&entry.action)
    .bind(&entry.target_type)
    .bind(&entry.target_id)
    .bind(&entry.reason)
    .bind(entry.confidence)
    .bind(&entry.before)
    .bind(&entry.after)
    .bind(entry.occurred_at)
    .bind(entry.correlation_id)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        tenant_id = %entry.tenant_id,
        action = %entry.action,
        target_type = %entry.target_type,
        target_id = %entry.target_id,
        "Audit entry appended"
    );
    Ok(())
}

/// Newest-first entries for one tenant.
pub async fn list(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    filter: &AuditFilter,
) -> Result<Vec<AuditEntry>, AuditError> {
    let entries = sqlx::query_as::<_, AuditEntry>(
        r#"
        SELECT id, tenant_id, actor_type, actor_id, action, target_type, target_id,
               reason, confidence, before, after, occurred_at, correlation_id
        FROM audit_log
        WHERE tenant_id = $1
          AND ($2::text IS NULL OR action = $2)
          AND ($3::text IS NULL OR target_type = $3)
          AND ($4::timestamptz IS NULL OR occurred_at >= $4)
        ORDER BY occurred_at DESC
        LIMIT $5
        "#,
    )
    .bind(tenant_id)
    .bind(&filter.action)
    .bind(&filter.target_type)
    .bind(filter.since)
    .bind(filter.effective_limit())
    .fetch_all(&mut *conn)
    .await?;

    Ok(entries)
}
