use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{ReportFormat, ReportJob, ReportKind, ReportRequest};
use crate::service::ReportService;

pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct AppState {
    pub reports: ReportService,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/reports", post(request_report))
        .route("/api/reports/{id}", get(get_report))
        .route("/api/reports/{id}/download", get(download_report))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

/// Health check endpoint handler
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "reporting",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Error response wrapper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = match &error {
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::NotReady(_) => StatusCode::CONFLICT,
            PipelineError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %error, "Report request failed");
            "Internal error".to_string()
        } else {
            error.to_string()
        };

        Self { status, message }
    }
}

/// Tenant taken from the `x-tenant-id` header.
#[derive(Debug, Clone, Copy)]
pub struct TenantId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for TenantId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(TenantId)
            .ok_or_else(|| ApiError {
                status: StatusCode::BAD_REQUEST,
                message: format!("missing or invalid {} header", TENANT_HEADER),
            })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub kind: ReportKind,
    pub format: ReportFormat,
    pub range_from: Option<DateTime<Utc>>,
    pub range_to: Option<DateTime<Utc>>,
    pub correlation_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub url: String,
}

/// POST /api/reports
pub async fn request_report(
    State(state): State<Arc<AppState>>,
    TenantId(tenant_id): TenantId,
    Json(body): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportJob>), ApiError> {
    let job = state
        .reports
        .request_report(ReportRequest {
            tenant_id,
            kind: body.kind,
            format: body.format,
            range_from: body.range_from,
            range_to: body.range_to,
            correlation_id: body.correlation_id,
        })
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /api/reports/{id}
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportJob>, ApiError> {
    Ok(Json(state.reports.get_report(tenant_id, id).await?))
}

/// GET /api/reports/{id}/download
pub async fn download_report(
    State(state): State<Arc<AppState>>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let url = state.reports.download_url(tenant_id, id).await?;
    Ok(Json(DownloadResponse { url }))
}
