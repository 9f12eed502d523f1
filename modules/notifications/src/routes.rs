use axum::{routing::get, Json, Router};
use serde_json::Value;
use tower_http::cors::CorsLayer;

pub fn router() -> Router {
    Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "notifications-rs",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
