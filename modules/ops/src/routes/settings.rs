use axum::{extract::State, Json};
use std::sync::Arc;

use super::{ApiError, AppState, Caller};
use crate::models::{AiSettingsUpdate, RetentionSettingsUpdate, TenantSettings};

/// GET /api/ops/settings/ai
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<TenantSettings>, ApiError> {
    Ok(Json(state.governance.get_settings(caller.tenant_id).await?))
}

/// PUT /api/ops/settings/ai
pub async fn update_ai_settings(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(update): Json<AiSettingsUpdate>,
) -> Result<Json<TenantSettings>, ApiError> {
    let settings = state
        .governance
        .update_ai_settings(caller.tenant_id, update, caller.user_id)
        .await?;
    Ok(Json(settings))
}

/// PUT /api/ops/settings/retention
pub async fn update_retention_settings(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(update): Json<RetentionSettingsUpdate>,
) -> Result<Json<TenantSettings>, ApiError> {
    let settings = state
        .governance
        .update_retention_settings(caller.tenant_id, update, caller.user_id)
        .await?;
    Ok(Json(settings))
}
