//! HTTP routing tests
//!
//! Drives the full router with `oneshot` against an in-memory store.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::*;
use http_body_util::BodyExt;
use leadflow_journey::poller::{LocalMarkerFile, PollerConfig, ProcessedMarkers, ReconciliationPoller};
use leadflow_journey::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app(dir: &tempfile::TempDir, default_tenant: Option<&str>) -> (Router, SqlitePool) {
    let (pool, store) = create_test_store().await;
    let local = LocalMarkerFile::open(dir.path().join("processed_markers.json")).await;
    let poller = Arc::new(ReconciliationPoller::new(
        store.clone(),
        store.clone(),
        ProcessedMarkers::new(store.clone(), local),
        PollerConfig::default(),
    ));
    let state = AppState::new(journey_service(&store), poller, default_tenant.map(str::to_string));
    (build_router(state), pool)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_reports_module_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _pool) = test_app(&dir, None).await;

    let (status, body) = send(&app, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "leadflow-journey");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["poller_running"], false);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_list_journeys_requires_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _pool) = test_app(&dir, None).await;

    let (status, body) = send(&app, "GET", "/api/journeys").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_list_journeys_uses_default_tenant() {
    let dir = tempfile::tempdir().unwrap();
    let (app, pool) = test_app(&dir, Some(TENANT)).await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368", "nome": "Ana"})).await;
    seed_forms(&pool, json!({"id": "f1", "contactPhone": "31999972368", "passed": true})).await;

    let (status, body) = send(&app, "GET", "/api/journeys").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenantId"], TENANT);
    assert_eq!(body["count"], 1);
    let journey = &body["journeys"][0];
    assert_eq!(journey["telefoneNormalizado"], "5531999972368");
    assert_eq!(journey["pipelineStatus"], "formulario-aprovado");
    assert!(journey["timeline"].as_array().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn test_journey_by_phone_found_and_missing() {
    let dir = tempfile::tempdir().unwrap();
    let (app, pool) = test_app(&dir, None).await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368"})).await;

    let (status, body) = send(&app, "GET", "/api/journeys/by-phone/5531999972368?tenant=t1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["id"], "c1");

    let (status, body) = send(&app, "GET", "/api/journeys/by-phone/31900000000?tenant=t1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_pipeline_counts_lists_every_stage_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (app, pool) = test_app(&dir, None).await;
    seed_contacts(&pool, json!([{"id": "c1", "telefone": "31999972368"}, {"id": "c2", "telefone": "31988887777"}])).await;

    let (status, body) = send(&app, "GET", "/api/pipeline/counts?tenant=t1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let stages = body["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 11);
    assert_eq!(stages[0]["stage"], "contato-inicial");
    assert_eq!(stages[0]["count"], 2);
    assert_eq!(stages[10]["stage"], "consultor");
}

#[tokio::test]
async fn test_manual_poller_run_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let (app, pool) = test_app(&dir, None).await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368", "cpf": "12345678909"})).await;
    seed_checks(&pool, json!({"id": "k1", "cpf": "12345678909", "status": "approved"})).await;

    let (status, body) = send(&app, "POST", "/api/poller/run").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processedCount"], 1);
    assert_eq!(body["appliedCount"], 1);
    assert_eq!(body["skipped"], false);

    let (status, body) = send(&app, "GET", "/api/poller/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["runs"], 1);
    assert_eq!(body["totalProcessed"], 1);
    assert_eq!(body["timerActive"], false);
}
