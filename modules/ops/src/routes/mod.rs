//! HTTP surface
//!
//! The caller's tenant comes from the `x-tenant-id` header and the acting
//! user from `x-user-id`. Authentication happens upstream.

pub mod audit;
pub mod proposals;
pub mod settings;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::GovernanceError;
use crate::health::health;
use crate::services::GovernanceService;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub governance: GovernanceService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ops/proposals", post(proposals::create_proposal))
        .route("/api/ops/proposals/{id}", get(proposals::get_proposal))
        .route("/api/ops/proposals/{id}/approve", post(proposals::approve_proposal))
        .route("/api/ops/proposals/{id}/reject", post(proposals::reject_proposal))
        .route("/api/ops/proposals/{id}/activate", post(proposals::activate_proposal))
        .route(
            "/api/ops/settings/ai",
            get(settings::get_settings).put(settings::update_ai_settings),
        )
        .route("/api/ops/settings/retention", axum::routing::put(settings::update_retention_settings))
        .route("/api/ops/audit", get(audit::list_audit))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Error response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<GovernanceError> for ApiError {
    fn from(error: GovernanceError) -> Self {
        let status = match &error {
            GovernanceError::ProposalNotFound(_) | GovernanceError::SettingsNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            GovernanceError::AlreadyDecided(_) | GovernanceError::NotApproved(_) => {
                StatusCode::CONFLICT
            }
            GovernanceError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, "Governance request failed");
            "Internal error".to_string() // Don't leak internal details
        } else {
            error.to_string()
        };

        Self { status, message }
    }
}

/// Tenant and actor taken from request headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub tenant_id: Uuid,
    pub user_id: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::bad_request(format!("missing {} header", TENANT_HEADER)))?;
        let tenant_id = Uuid::parse_str(tenant_id.trim())
            .map_err(|_| ApiError::bad_request(format!("invalid {} header", TENANT_HEADER)))?;

        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self { tenant_id, user_id })
    }
}
