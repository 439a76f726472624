use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use roster::persistence::{SledEventLog, SledRegistry};
use serde_json::{Value, json};
use server_http::{AppState, build_router};
use shared::config::CacheSettings;
use std::sync::Arc;
use std::time::Duration;
use storage_engine::MemoryStore;
use tower::ServiceExt;

fn app() -> Router {
    let settings = CacheSettings {
        consumer_poll_interval: Duration::from_millis(10),
        reconcile_interval: Duration::from_secs(3600),
        ..CacheSettings::default()
    };
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SledRegistry::temporary().unwrap()),
        Arc::new(SledEventLog::temporary().unwrap()),
        settings,
        "api-test",
    );
    build_router(state, &["*".to_string()])
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router, email: &str, name: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/registrations",
        Some(json!({ "email": email, "full_name": name, "internal_notes": "comp" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
    body
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
}

#[tokio::test]
async fn test_create_then_list() {
    let app = app();
    let created = register(&app, "ada@example.com", "Ada Lovelace").await;
    assert_eq!(created["event_published"], true);
    assert_eq!(created["registration"]["ticket_type"], "general");
    assert!(created["registration"].get("internal_notes").is_none());
    assert!(created["registration"].get("confirmation_token").is_none());

    let (status, body) = send(&app, Method::GET, "/registrations?page=1&size=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
    assert_eq!(body["records"][0]["email"], "ada@example.com");
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["meta"]["has_next"], false);
}

#[tokio::test]
async fn test_newest_registration_lists_first() {
    let app = app();
    register(&app, "first@example.com", "First").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    register(&app, "second@example.com", "Second").await;

    let (_, body) = send(&app, Method::GET, "/registrations?size=1", None).await;
    assert_eq!(body["records"][0]["email"], "second@example.com");
    assert_eq!(body["meta"]["total"], 2);
    assert_eq!(body["meta"]["has_next"], true);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = app();
    register(&app, "ada@example.com", "Ada").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/registrations",
        Some(json!({ "email": "ADA@example.com", "full_name": "Ada Again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/registrations",
        Some(json!({ "email": "not-an-email", "full_name": "Nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    let (status, _) = send(&app, Method::GET, "/registrations?page=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/registrations?size=500", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_lookup() {
    let app = app();
    register(&app, "ada@example.com", "Ada").await;

    let uri = "/registrations/status/Ada@Example.com";
    let (status, body) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "registered");
    assert_eq!(body["registration"]["full_name"], "Ada");

    let uri = "/registrations/status/bob@example.com";
    let (status, body) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "not_registered");
}

#[tokio::test]
async fn test_update_changes_listing_and_status() {
    let app = app();
    let created = register(&app, "ada@example.com", "Ada").await;
    let id = created["registration"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/registrations/{id}"),
        Some(json!({ "email": "ada@lovelace.dev", "full_name": "Augusta Ada King" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registration"]["full_name"], "Augusta Ada King");

    let (_, old) = send(&app, Method::GET, "/registrations/status/ada@example.com", None).await;
    assert_eq!(old["status"], "not_registered");
    let (_, new) = send(&app, Method::GET, "/registrations/status/ada@lovelace.dev", None).await;
    assert_eq!(new["status"], "registered");

    let (_, list) = send(&app, Method::GET, "/registrations", None).await;
    assert_eq!(list["records"][0]["full_name"], "Augusta Ada King");
}

#[tokio::test]
async fn test_cancel_then_missing() {
    let app = app();
    let created = register(&app, "ada@example.com", "Ada").await;
    let id = created["registration"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::DELETE, &format!("/registrations/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::DELETE, &format!("/registrations/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (_, list) = send(&app, Method::GET, "/registrations", None).await;
    assert!(list["records"].as_array().unwrap().is_empty());
    assert_eq!(list["meta"]["total"], 0);
}

#[tokio::test]
async fn test_admin_endpoints() {
    let app = app();
    register(&app, "ada@example.com", "Ada").await;
    register(&app, "bob@example.com", "Bob").await;

    let (status, body) = send(&app, Method::POST, "/admin/reconcile", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = send(&app, Method::GET, "/admin/dead-letters", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["group"], "api-test");
    assert!(body["dead_letters"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_events_endpoint_streams() {
    let app = app();
    let request = Request::builder()
        .uri("/events?type=created")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}
