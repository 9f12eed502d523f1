use axum::{
    extract::{Query, State},
    Json,
};
use platform_audit::{AuditEntry, AuditFilter};
use std::sync::Arc;

use super::{ApiError, AppState, Caller};

/// GET /api/ops/audit?action=&target_type=&since=&limit=
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<AuditFilter>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let entries = state.governance.list_audit(caller.tenant_id, &filter).await?;
    Ok(Json(entries))
}
