use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use bulkmail_api::{ApiConfig, AppState, router};
use bulkmail_common::{UserId, Validator};
use bulkmail_delivery::{Dispatcher, MockTransport};
use bulkmail_ledger::{LogStore, MemoryLogStore};
use bulkmail_vault::{SettingsStore, SettingsUpdate, Vault};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test-secret-that-is-long-enough-for-aes";

async fn app_with(transport: MockTransport) -> Router {
    app_with_store(transport, Arc::new(MemoryLogStore::new())).await
}

async fn app_with_store(transport: MockTransport, store: Arc<dyn LogStore>) -> Router {
    let settings = SettingsStore::new(Vault::new(SECRET).expect("vault"));
    settings
        .update(
            &UserId::new("alice"),
            SettingsUpdate {
                api_key: Some("re_alice_key".to_string()),
                sender_email: Some("news@example.com".to_string()),
                sender_name: Some("Example News".to_string()),
            },
        )
        .await
        .expect("seed alice");

    let dispatcher = Dispatcher::new(
        Validator::default(),
        Arc::new(settings.clone()),
        Arc::new(transport),
        store,
    );

    let config = ApiConfig::default();
    let state = AppState::new(dispatcher, settings, &config.user_header).expect("state");
    router(state, &config)
}

async fn app() -> Router {
    app_with(MockTransport::new()).await
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }

    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");

    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn batch(recipients: &[&str]) -> Value {
    json!({
        "subject": "Launch",
        "body": "We are live.\nThanks!",
        "recipients": recipients,
        "delaySeconds": 0,
    })
}

#[tokio::test]
async fn test_liveness_needs_no_caller() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/health/live", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = app().await;

    let (status, body) = call(&app, Method::GET, "/api/emails/stats", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, _) = call(&app, Method::GET, "/api/emails/stats", Some("  "), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_then_read_history() {
    let app = app_with(MockTransport::new().fail_for("b@example.com", "Invalid recipient")).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/emails/send",
        Some("alice"),
        Some(batch(&["a@example.com", "b@example.com", "c@example.com"])),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["sent"], json!(2));
    assert_eq!(body["failed"], json!(1));
    assert_eq!(body["total"], json!(3));
    assert_eq!(
        body["errors"],
        json!([{ "recipient": "b@example.com", "error": "Invalid recipient" }])
    );

    let (status, page) = call(
        &app,
        Method::GET,
        "/api/emails/logs?status=FAILED&pageSize=10",
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], json!(1));
    assert_eq!(page["pageSize"], json!(10));
    assert_eq!(page["data"][0]["recipient_email"], json!("b@example.com"));
    assert_eq!(page["data"][0]["error_message"], json!("Invalid recipient"));
    assert!(page["data"][0].get("user_id").is_none());

    let (_, page) = call(
        &app,
        Method::GET,
        "/api/emails/logs?search=C%40EXAMPLE",
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(page["total"], json!(1));

    let (_, stats) = call(&app, Method::GET, "/api/emails/stats", Some("alice"), None).await;
    assert_eq!(stats["total"], json!(3));
    assert_eq!(stats["sent"], json!(2));
    assert_eq!(stats["failed"], json!(1));

    let (_, other) = call(&app, Method::GET, "/api/emails/stats", Some("bob"), None).await;
    assert_eq!(other["total"], json!(0));
}

#[tokio::test]
async fn test_invalid_batch_lists_every_problem() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/emails/send",
        Some("alice"),
        Some(json!({ "subject": "", "body": "", "recipients": [] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["details"],
        json!([
            "Subject is required",
            "Email body is required",
            "At least one recipient is required",
        ])
    );
}

#[tokio::test]
async fn test_unconfigured_user_cannot_send() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/emails/send",
        Some("bob"),
        Some(batch(&["a@example.com"])),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.contains("not configured")),
        "{body}"
    );
}

#[tokio::test]
async fn test_settings_never_expose_key() {
    let app = app().await;

    let (status, body) = call(&app, Method::GET, "/api/settings", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "id": "alice",
            "sender_email": "news@example.com",
            "sender_name": "Example News",
            "has_api_key": true,
        })
    );

    let (status, body) = call(
        &app,
        Method::PUT,
        "/api/settings",
        Some("bob"),
        Some(json!({ "resend_api_key": "re_bob_key", "sender_email": "bob@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_api_key"], json!(true));
    assert!(!body.to_string().contains("re_bob_key"));

    let (status, _) = call(
        &app,
        Method::PUT,
        "/api/settings",
        Some("bob"),
        Some(json!({ "sender_email": "not-an-email" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_connection_check() {
    let app = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/settings/test-connection",
        Some("alice"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "message": "API key is valid" }));

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/settings/test-connection",
        Some("bob"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let rejecting = app_with(MockTransport::new().reject_all("API key is invalid")).await;
    let (status, body) = call(
        &rejecting,
        Method::POST,
        "/api/settings/test-connection",
        Some("bob"),
        Some(json!({ "api_key": "re_wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": false, "message": "API key is invalid" }));
}

#[tokio::test]
async fn test_parse_recipients() {
    let app = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/api/recipients/parse",
        Some("alice"),
        Some(json!({ "content": "a@b.com,bad\nA@B.COM" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "valid": ["a@b.com"], "invalid": ["bad"], "duplicates": ["A@B.COM"] })
    );
}

#[tokio::test]
async fn test_background_batch_lifecycle() {
    let app = app().await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/emails/batches",
        Some("alice"),
        Some(batch(&["a@example.com", "b@example.com"])),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let batch_id = body["batch_id"].as_str().expect("batch id").to_string();
    let uri = format!("/api/emails/batches/{batch_id}");

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (status, body) = call(&app, Method::GET, &uri, Some("alice"), None).await;
            assert_eq!(status, StatusCode::OK);
            if body["in_flight"] == json!(false) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("batch finishes");

    assert_eq!(finished["sent"], json!(2));
    assert_eq!(finished["batch_id"], json!(batch_id));

    let (status, _) = call(&app, Method::GET, &uri, Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, Method::DELETE, &uri, Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::GET,
        "/api/emails/batches/not-a-ulid",
        Some("alice"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_finishes_after_client_disconnects() {
    let store = Arc::new(MemoryLogStore::new());
    let app = app_with_store(
        MockTransport::new().latency(Duration::from_millis(300)),
        store.clone(),
    )
    .await;

    let disconnected = tokio::time::timeout(
        Duration::from_millis(100),
        call(
            &app,
            Method::POST,
            "/api/emails/send",
            Some("alice"),
            Some(batch(&["a@example.com", "b@example.com"])),
        ),
    )
    .await;
    assert!(disconnected.is_err(), "request should still be in progress");

    let alice = UserId::new("alice");
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let rows = store.attempts_for_user(&alice).await.expect("rows");
            if rows.len() == 2 && rows.iter().all(|row| row.is_terminal()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("no attempt left queued");
}
