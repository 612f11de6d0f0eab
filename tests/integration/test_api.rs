// HTTP surface driven through the router with in-memory collaborators

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use todos_api::api::create_router;
use todos_api::config::Config;

use crate::common::{wait_for_events, Harness};

const PRINCIPAL: &str = "x-authenticated-user";

fn app(h: &Harness) -> Router {
    let state = h.app_state();
    create_router(&state).with_state(state)
}

fn request(method: &str, uri: &str, principal: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(principal) = principal {
        builder = builder.header(PRINCIPAL, principal);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_endpoint_returns_200() {
    let h = Harness::new();
    let app = app(&h);

    let (status, health) = send_json(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["circuitBreaker"]["healthy"], true);
    assert!(health["circuitBreaker"]["stats"]["deleteOne"].is_object());
}

#[tokio::test]
async fn test_missing_principal_is_401() {
    let h = Harness::new();
    let app = app(&h);

    let mut req = request("GET", "/todos", None, None);
    req.headers_mut()
        .insert("x-request-id", "req-42".parse().unwrap());
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized", "request_id": "req-42"}));
    assert_eq!(h.collection.calls("find"), 0);
}

#[tokio::test]
async fn test_create_then_list() {
    let h = Harness::new();
    let app = app(&h);

    let (status, created) = send_json(
        &app,
        request("POST", "/todos", Some("alice"), Some(json!({"content": "buy milk"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created, json!({"id": 1, "content": "buy milk"}));

    let (status, listed) = send_json(&app, request("GET", "/todos", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([{"id": 1, "content": "buy milk"}]));
}

#[tokio::test]
async fn test_blank_content_is_400() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) = send_json(
        &app,
        request("POST", "/todos", Some("alice"), Some(json!({"content": "   "}))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    assert_eq!(h.collection.calls("insertOne"), 0);
}

#[tokio::test]
async fn test_delete_returns_204_without_body() {
    let h = Harness::new();
    h.collection.seed("alice", 1, "buy milk");
    let app = app(&h);

    let (status, body) = send(&app, request("DELETE", "/todos/1", Some("alice"), None)).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert!(h.collection.documents_of("alice").is_empty());
}

#[tokio::test]
async fn test_delete_missing_is_404() {
    let h = Harness::new();
    let app = app(&h);

    let (status, body) =
        send_json(&app, request("DELETE", "/todos/99", Some("alice"), None)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Todo not found");
}

#[tokio::test]
async fn test_other_principals_items_are_invisible() {
    let h = Harness::new();
    h.collection.seed("bob", 1, "fix bike");
    let app = app(&h);

    let (status, _) = send_json(&app, request("DELETE", "/todos/1", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, listed) = send_json(&app, request("GET", "/todos", Some("alice"), None)).await;
    assert_eq!(listed, json!([]));
    assert_eq!(h.collection.documents_of("bob").len(), 1);
}

#[tokio::test]
async fn test_update_replaces_content() {
    let h = Harness::new();
    h.collection.seed("alice", 1, "buy milk");
    let app = app(&h);

    let (status, updated) = send_json(
        &app,
        request("PUT", "/todos/1", Some("alice"), Some(json!({"content": "buy oat milk"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated, json!({"id": 1, "content": "buy oat milk"}));
}

#[tokio::test]
async fn test_non_numeric_task_id_is_400() {
    let h = Harness::new();
    let app = app(&h);

    let (status, _) = send_json(&app, request("DELETE", "/todos/abc", Some("alice"), None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.collection.calls("deleteOne"), 0);
}

#[tokio::test]
async fn test_trace_id_reaches_log_event() {
    let h = Harness::new();
    let app = app(&h);

    let mut req = request("POST", "/todos", Some("alice"), Some(json!({"content": "buy milk"})));
    req.headers_mut()
        .insert("x-b3-traceid", "463ac35c9f6413ad".parse().unwrap());
    let (status, _) = send_json(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    wait_for_events(&h.channel, 1).await;
    assert_eq!(h.channel.events()[0]["zipkinSpan"], "463ac35c9f6413ad");
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let h = Harness::new();
    let app = app(&h);
    let content = "x".repeat(2 * 1024 * 1024);
    let payload = json!({ "content": content }).to_string();

    let req = Request::builder()
        .method("POST")
        .uri("/todos")
        .header(PRINCIPAL, "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap();
    let (status, _) = send(&app, req).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(h.collection.calls("insertOne"), 0);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_cache_counters() {
    let h = Harness::new();
    let app = app(&h);
    send_json(&app, request("GET", "/todos", Some("alice"), None)).await;

    let (status, body) = send(&app, request("GET", "/metrics", None, None)).await;
    let text = String::from_utf8(body).unwrap();

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("todos_cache_operations_total{operation=\"get\",outcome=\"miss\"} 1"));
    assert!(text.contains("todos_cache_operations_total{operation=\"set\",outcome=\"ok\"} 1"));
}

#[tokio::test]
async fn test_metrics_endpoint_lists_every_breaker_before_traffic() {
    let h = Harness::new();
    let app = app(&h);

    let (_, body) = send(&app, request("GET", "/metrics", None, None)).await;
    let text = String::from_utf8(body).unwrap();

    for operation in ["find", "findOne", "insertOne", "deleteOne", "updateOne"] {
        let series = format!("todos_circuit_breaker_state{{operation=\"{}\"}} 0", operation);
        assert!(text.contains(&series), "missing {}", series);
    }
}

#[tokio::test]
async fn test_body_without_content_is_422_error_body() {
    let h = Harness::new();
    let app = app(&h);

    let mut req = request("POST", "/todos", Some("alice"), Some(json!({"text": "buy milk"})));
    req.headers_mut()
        .insert("x-request-id", "req-7".parse().unwrap());
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["request_id"], "req-7");
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    assert_eq!(h.collection.calls("insertOne"), 0);
}

#[tokio::test]
async fn test_malformed_json_is_400_error_body() {
    let h = Harness::new();
    let app = app(&h);

    let req = Request::builder()
        .method("PUT")
        .uri("/todos/1")
        .header(PRINCIPAL, "alice")
        .header("x-b3-traceid", "abc")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"content\": "))
        .unwrap();
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["request_id"], "abc");
    assert_eq!(h.collection.calls("updateOne"), 0);
}

#[tokio::test]
async fn test_missing_content_type_is_415_error_body() {
    let h = Harness::new();
    let app = app(&h);

    let req = Request::builder()
        .method("POST")
        .uri("/todos")
        .header(PRINCIPAL, "alice")
        .body(Body::from(json!({"content": "buy milk"}).to_string()))
        .unwrap();
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].is_string());
    assert!(body["request_id"].is_string());
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_is_408_error_body() {
    let h = Harness::new();
    h.collection.set_delay(Some(Duration::from_secs(3)));
    let mut state = h.app_state();
    state.config = Arc::new(Config {
        request_timeout_secs: 1,
        ..Config::test_config()
    });
    let app = create_router(&state).with_state(state);

    let mut req = request("GET", "/todos", Some("alice"), None);
    req.headers_mut()
        .insert("x-b3-traceid", "slow-1".parse().unwrap());
    let (status, body) = send_json(&app, req).await;

    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(
        body,
        json!({"error": "Request timed out", "request_id": "slow-1"})
    );
}
