#![cfg(feature = "web")]

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use foot_traffic::app::{AppState, router};
use foot_traffic::config::{DashboardConfig, Variant};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};
use tower::ServiceExt;

fn config(dir: &Path, variant: Variant) -> DashboardConfig {
    DashboardConfig {
        stores_path: dir.join("stores.csv"),
        customers_path: dir.join("customers.csv"),
        visits_path: dir.join("visits.csv"),
        ..DashboardConfig::for_variant(variant)
    }
}

async fn loaded_state(variant: Variant) -> (TempDir, Arc<AppState>) {
    let dir = tempdir().unwrap();
    common::csv_fixture(dir.path());
    let state = Arc::new(AppState::from_config(config(dir.path(), variant)));
    state.driver().refresh_once(false).await.unwrap();
    (dir, state)
}

async fn get(state: &Arc<AppState>, uri: &str) -> Response {
    router(Arc::clone(state))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn serves_dashboard_page() {
    let (_dir, state) = loaded_state(Variant::Basic).await;
    let response = get(&state, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("Foot Traffic Dashboard"));
}

#[tokio::test]
async fn summary_is_unavailable_before_first_load() {
    let dir = tempdir().unwrap();
    let state = Arc::new(AppState::from_config(config(dir.path(), Variant::Basic)));

    let response = get(&state, "/api/summary").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(response).await["status"], "error");
}

#[tokio::test]
async fn summary_tiles_per_variant() {
    let (_dir, basic) = loaded_state(Variant::Basic).await;
    let body = json(get(&basic, "/api/summary").await).await;
    assert_eq!(body["generation"], 1);
    assert_eq!(body["tiles"].as_array().unwrap().len(), 3);
    assert_eq!(body["summary"]["total_visits"], 4);

    let (_dir, full) = loaded_state(Variant::Full).await;
    let body = json(get(&full, "/api/summary").await).await;
    let tiles = body["tiles"].as_array().unwrap();
    assert_eq!(tiles.len(), 4);
    assert_eq!(tiles[0]["label"], "Store Count");
    assert_eq!(tiles[2]["delta"], "+0");
}

#[tokio::test]
async fn layout_lists_variant_widgets() {
    let (_dir, state) = loaded_state(Variant::Full).await;
    let body = json(get(&state, "/api/layout").await).await;

    assert_eq!(body["variant"], "full");
    assert_eq!(body["raw_row_limit"], 80);
    let slugs: Vec<&str> = body["widgets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["slug"].as_str().unwrap())
        .collect();
    assert!(slugs.contains(&"payment_methods"));
    assert!(!slugs.contains(&"stores_by_state"));
}

#[tokio::test]
async fn widget_data_and_charts() {
    let (_dir, state) = loaded_state(Variant::Basic).await;

    let body = json(get(&state, "/api/widgets/stores_by_state?top_n=1").await).await;
    assert_eq!(body["result"]["type"], "ranking");
    assert_eq!(body["result"]["data"][0]["key"], "CA");
    assert_eq!(body["result"]["data"].as_array().unwrap().len(), 1);

    let response = get(&state, "/charts/visits_by_period").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/svg+xml");
    assert!(text(response).await.starts_with("<svg"));
}

#[tokio::test]
async fn unknown_or_hidden_widgets_are_not_found() {
    let (_dir, state) = loaded_state(Variant::Basic).await;
    assert_eq!(get(&state, "/api/widgets/nope").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        get(&state, "/charts/payment_methods").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn bad_parameters_are_rejected() {
    let (_dir, state) = loaded_state(Variant::Basic).await;
    assert_eq!(
        get(&state, "/api/widgets/visits_by_period?bucket_days=0").await.status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        get(&state, "/api/widgets/stores_by_state?top_n=500").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn raw_rows_are_capped() {
    let (_dir, state) = loaded_state(Variant::Basic).await;

    let body = json(get(&state, "/api/raw?limit=2").await).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 2);
    assert_eq!(body["total_rows"], 4);
    assert_eq!(body["rows"][0]["store_id"], "007");

    let body = json(get(&state, "/api/raw?limit=1000").await).await;
    assert_eq!(body["rows"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn export_formats() {
    let (_dir, state) = loaded_state(Variant::Basic).await;

    let response = get(&state, "/api/raw/export?format=csv").await;
    assert_eq!(response.status(), StatusCode::OK);
    let csv = text(response).await;
    assert_eq!(csv.lines().count(), 5);
    assert!(csv.starts_with("customer_id,store_id,visit_date"));

    let response = get(&state, "/api/raw/export?format=xlsx").await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..2], b"PK");

    assert_eq!(
        get(&state, "/api/raw/export?format=pdf").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn refresh_is_accepted_and_status_reported() {
    let (_dir, state) = loaded_state(Variant::Basic).await;

    let response = router(Arc::clone(&state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json(response).await["status"], "queued");

    let status = json(get(&state, "/api/status").await).await;
    assert_eq!(status["state"], "idle");
    assert_eq!(status["generation"], 1);
    assert!(status["last_error"].is_null());
}

#[tokio::test]
async fn malformed_query_values_get_json_errors() {
    let (_dir, state) = loaded_state(Variant::Basic).await;

    for uri in [
        "/api/widgets/visits_by_period?bucket_days=-1",
        "/charts/stores_by_state?top_n=abc",
        "/api/raw?limit=many",
    ] {
        let response = get(&state, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
}
