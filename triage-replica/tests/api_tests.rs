//! Integration tests for the triage-replica HTTP API
//!
//! Requests go through the real router via `tower::ServiceExt::oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use helpers::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use triage_common::config::ServerConfig;
use triage_common::Severity;
use triage_replica::api::{build_router, AppState};
use triage_replica::source::FixtureSource;

fn setup_router() -> (axum::Router, Arc<FixtureSource>) {
    let (state, source, sync) = setup();
    let server = ServerConfig {
        host: "bugs.example.org".to_string(),
        product: PRODUCT.to_string(),
        use_ssl: true,
    };
    let app = AppState::new(state, Arc::new(sync), server, CancellationToken::new());
    (build_router(app), source)
}

/// Send one request and decode the JSON body, if any
async fn request(
    app: &axum::Router,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    let builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(json_body) => builder
            .header("content-type", "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json_body = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, json_body)
}

fn record_ids(body: &Value) -> Vec<i64> {
    body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect()
}

/// Router with the fixture already synced: order [2, 5, 6, 3, 1]
async fn synced_router() -> axum::Router {
    let (app, _source) = setup_router();
    let (status, _) = request(&app, Method::POST, "/api/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    app
}

#[tokio::test]
async fn test_health() {
    let (app, _source) = setup_router();

    let (status, body) = request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["module"], "triage-replica");
}

#[tokio::test]
async fn test_sync_then_list_records() {
    let (app, _source) = setup_router();

    let (status, body) = request(&app, Method::POST, "/api/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary = body.unwrap();
    assert_eq!(summary["new_count"], 5);
    assert_eq!(summary["initial"], true);

    let (status, body) = request(&app, Method::GET, "/api/records", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(record_ids(&body), vec![2, 5, 6, 3, 1]);
    assert_eq!(body["levels"], json!({ "high": 1, "medium": 2, "low": 3 }));

    let first = &body["records"][0];
    assert_eq!(first["tier"], "high");
    assert_eq!(first["url"], "https://bugs.example.org/show_bug.cgi?id=2");
    assert_eq!(first["local_priority"], 0);
    assert_eq!(body["records"][4]["tier"], Value::Null);
}

#[tokio::test]
async fn test_get_record() {
    let app = synced_router().await;

    let (status, body) = request(&app, Method::GET, "/api/records/6", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["severity"], "Major");
    assert_eq!(body["tier"], "medium");

    let (status, body) = request(&app, Method::GET, "/api/records/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.unwrap()["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_set_order_near() {
    let app = synced_router().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/order",
        Some(json!({ "target_position": 0, "ids": [3, 1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["outcome"], "moved");
    assert_eq!(body["ids"], json!([3, 1]));

    let (_, body) = request(&app, Method::GET, "/api/records", None).await;
    assert_eq!(record_ids(&body.unwrap()), vec![3, 1, 2, 5, 6]);

    // Dropping onto the selection itself
    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/order",
        Some(json!({ "target_position": 1, "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["outcome"], "unchanged");
}

#[tokio::test]
async fn test_set_order_near_rejects_bad_input() {
    let app = synced_router().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/order",
        Some(json!({ "target_position": 9, "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/records/order",
        Some(json!({ "target_position": 0, "ids": [1, 42] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = request(&app, Method::GET, "/api/records", None).await;
    assert_eq!(record_ids(&body.unwrap()), vec![2, 5, 6, 3, 1]);
}

#[tokio::test]
async fn test_set_tier() {
    let app = synced_router().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/tier",
        Some(json!({ "tier": "high", "at_top": true, "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["outcome"], "moved");
    assert_eq!(body["levels"], json!({ "high": 2, "medium": 3, "low": 4 }));

    let (_, body) = request(&app, Method::GET, "/api/records/1", None).await;
    let body = body.unwrap();
    assert_eq!(body["local_priority"], 0);
    assert_eq!(body["tier"], "high");
    assert_eq!(body["is_new"], false);

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/tier",
        Some(json!({ "tier": "urgent", "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_malformed_requests_use_error_envelope() {
    let app = synced_router().await;

    // Body that is not JSON at all
    let raw = Request::builder()
        .method(Method::POST)
        .uri("/api/records/order")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(raw).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    // Missing field
    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/order",
        Some(json!({ "ids": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");

    // Non-numeric record id in the path
    let (status, body) = request(&app, Method::GET, "/api/records/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");

    // Missing content type
    let raw = Request::builder()
        .method(Method::POST)
        .uri("/api/records/2/tags")
        .body(Body::from(r#"{"tag":"OnHold"}"#))
        .unwrap();
    let response = app.clone().oneshot(raw).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (_, body) = request(&app, Method::GET, "/api/records", None).await;
    assert_eq!(record_ids(&body.unwrap()), vec![2, 5, 6, 3, 1]);
}

#[tokio::test]
async fn test_new_marker() {
    let app = synced_router().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/new",
        Some(json!({ "ids": [5, 2], "is_new": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["changed"], json!([2, 5]));
    assert_eq!(body["is_new"], false);

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/records/new",
        Some(json!({ "ids": [2], "is_new": false })),
    )
    .await;
    assert_eq!(body.unwrap()["changed"], json!([]));

    let (_, body) = request(&app, Method::GET, "/api/records", None).await;
    let body = body.unwrap();
    assert_eq!(record_ids(&body), vec![2, 5, 6, 3, 1]);
    assert_eq!(body["records"][0]["is_new"], false);
    assert_eq!(body["records"][2]["is_new"], true);
    assert_eq!(body["levels"], json!({ "high": 1, "medium": 2, "low": 3 }));

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/records/new",
        Some(json!({ "ids": [6, 42], "is_new": false })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = request(&app, Method::GET, "/api/records/6", None).await;
    assert_eq!(body.unwrap()["is_new"], true);

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/new",
        Some(json!({ "ids": [6] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.unwrap()["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_record_tags() {
    let app = synced_router().await;

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/records/2/tags",
        Some(json!({ "tag": "OnHold" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["changed"], true);
    assert_eq!(body["tags"], json!(["OnHold"]));

    let (_, body) = request(
        &app,
        Method::POST,
        "/api/records/2/tags",
        Some(json!({ "tag": "OnHold" })),
    )
    .await;
    assert_eq!(body.unwrap()["changed"], false);

    request(
        &app,
        Method::POST,
        "/api/records/2/tags",
        Some(json!({ "tag": "NeedInfo" })),
    )
    .await;
    let (_, body) = request(&app, Method::DELETE, "/api/records/2/tags/OnHold", None).await;
    assert_eq!(body.unwrap()["tags"], json!(["NeedInfo"]));

    let (status, body) = request(&app, Method::DELETE, "/api/records/2/tags", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["tags"], json!([]));

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/records/2/tags",
        Some(json!({ "tag": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(&app, Method::DELETE, "/api/records/99/tags", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tag_palette() {
    let (app, _source) = setup_router();

    let (status, body) = request(&app, Method::GET, "/api/tags", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = body.unwrap()["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["OnHold", "MacBug", "NeedInfo"]);

    let (status, body) = request(
        &app,
        Method::PUT,
        "/api/tags/Urgent",
        Some(json!({ "r": 255, "g": 0, "b": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap()["hex"], "#ff0000");

    let (status, _) = request(&app, Method::DELETE, "/api/tags/Urgent", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request(&app, Method::DELETE, "/api/tags/Urgent", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sync_failure_maps_to_bad_gateway() {
    let (app, source) = setup_router();
    source.fail_group("ASSIGNED", Severity::Minor).await;

    let (status, body) = request(&app, Method::POST, "/api/sync", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body.unwrap()["error"]["code"], "REMOTE_FETCH_FAILED");

    let (_, body) = request(&app, Method::GET, "/api/records", None).await;
    assert!(record_ids(&body.unwrap()).is_empty());
}

#[tokio::test]
async fn test_refresh() {
    let app = synced_router().await;

    let (status, _) = request(
        &app,
        Method::POST,
        "/api/sync/refresh",
        Some(json!({ "ids": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request(
        &app,
        Method::POST,
        "/api/sync/refresh",
        Some(json!({ "ids": [3] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["modified_count"], 1);
    assert_eq!(body["records_fetched"], 1);
}

#[tokio::test]
async fn test_event_stream_greets_with_replica_state() {
    use futures::StreamExt;

    let app = synced_router().await;
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/events")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = response.into_body().into_data_stream();
    let first = body.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: Connected"));
    assert!(text.contains("\"records\":5"));
}
