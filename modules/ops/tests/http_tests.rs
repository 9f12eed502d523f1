use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use event_bus::{EventPublisher, InMemoryBus};
use http_body_util::BodyExt;
use ops_rs::models::TenantSettings;
use ops_rs::repos::MemoryGovernanceStore;
use ops_rs::routes::{router, AppState, TENANT_HEADER, USER_HEADER};
use ops_rs::services::GovernanceService;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn app(store: &MemoryGovernanceStore) -> Router {
    let publisher = EventPublisher::new(Arc::new(InMemoryBus::new()), "afasa-ops");
    router(Arc::new(AppState {
        governance: GovernanceService::new(Arc::new(store.clone()), publisher),
    }))
}

fn post(uri: &str, tenant: Uuid, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(TENANT_HEADER, tenant.to_string())
        .header(USER_HEADER, "farmer-1")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn proposal_body() -> Value {
    json!({
        "intent_type": "irrigation",
        "proposed_rule": {"action": {"device_id": "valve-2", "command": "open"}},
        "confidence": 0.92
    })
}

#[tokio::test]
async fn health_reports_service_name() {
    let response = app(&MemoryGovernanceStore::new())
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["service"], "ops-rs");
}

#[tokio::test]
async fn missing_tenant_header_is_bad_request() {
    let response = app(&MemoryGovernanceStore::new())
        .oneshot(Request::get("/api/ops/settings/ai").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], "missing x-tenant-id header");
}

#[tokio::test]
async fn unknown_proposal_is_not_found() {
    let tenant = Uuid::new_v4();
    let response = app(&MemoryGovernanceStore::new())
        .oneshot(
            Request::get(format!("/api/ops/proposals/{}", Uuid::new_v4()))
                .header(TENANT_HEADER, tenant.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_then_double_approve_conflicts() {
    let store = MemoryGovernanceStore::new();
    let tenant = Uuid::new_v4();
    store.put_settings(TenantSettings::defaults(tenant));
    let app = app(&store);

    let response = app
        .clone()
        .oneshot(post("/api/ops/proposals", tenant, proposal_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["proposal"]["status"], "pending");
    assert_eq!(body["decision"]["reason"], "Tenant policy requires manual approval");
    let id = body["proposal"]["id"].as_str().unwrap().to_string();

    let approve_uri = format!("/api/ops/proposals/{}/approve", id);
    let response = app
        .clone()
        .oneshot(post(&approve_uri, tenant, json!({"reason": "looks right"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "approved");

    let response = app
        .clone()
        .oneshot(post(&approve_uri, tenant, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"], "Proposal already approved");

    let response = app
        .oneshot(post(&format!("/api/ops/proposals/{}/activate", id), tenant, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], "activated");
}

#[tokio::test]
async fn invalid_settings_update_is_bad_request() {
    let store = MemoryGovernanceStore::new();
    let tenant = Uuid::new_v4();
    store.put_settings(TenantSettings::defaults(tenant));

    let response = app(&store)
        .oneshot(
            Request::put("/api/ops/settings/retention")
                .header(TENANT_HEADER, tenant.to_string())
                .header("content-type", "application/json")
                .body(Body::from(json!({"retention_snapshots_days": 0}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store.audit_log().is_empty());
}

#[tokio::test]
async fn audit_listing_is_scoped_to_caller() {
    let store = MemoryGovernanceStore::new();
    let farm_a = Uuid::new_v4();
    let farm_b = Uuid::new_v4();
    store.put_settings(TenantSettings::defaults(farm_a));
    let app = app(&store);

    app.clone()
        .oneshot(post("/api/ops/proposals", farm_a, proposal_body()))
        .await
        .unwrap();

    let list = |tenant: Uuid| {
        Request::get("/api/ops/audit?action=rule_proposed")
            .header(TENANT_HEADER, tenant.to_string())
            .body(Body::empty())
            .unwrap()
    };

    let entries = read_json(app.clone().oneshot(list(farm_a)).await.unwrap()).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["actor_id"], "farmer-1");

    let entries = read_json(app.oneshot(list(farm_b)).await.unwrap()).await;
    assert!(entries.as_array().unwrap().is_empty());
}
