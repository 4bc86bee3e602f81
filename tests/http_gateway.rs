mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use common::{SECRET, TOPIC, push_payload, relay_config};
use pipeline_relay::bus::InMemoryBus;
use pipeline_relay::signature::sign;
use pipeline_relay::{AppState, Gateway, api};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app(base: &std::path::Path) -> (axum::Router, Arc<InMemoryBus>) {
    let config = relay_config(base, |_| {});
    let bus = Arc::new(InMemoryBus::from_config(TOPIC, &config.bus));
    let state = Arc::new(AppState::new(Gateway::new(config, bus.clone())));
    (api::router(state), bus)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn webhook_accepts_signed_push() {
    let base = tempfile::tempdir().unwrap();
    let (app, bus) = app(base.path());
    let mut subscription = bus.subscribe().unwrap();
    let body = push_payload("https://example/repo.git", "refs/heads/main", "abc123");

    let response = app
        .oneshot(
            Request::post("/webhook")
                .header("X-Hub-Signature-256", sign(SECRET, &body).unwrap())
                .header("Content-Type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Event submitted.");
    let id = json["message_id"].as_str().unwrap().to_string();

    let message = subscription.recv().await.unwrap();
    assert_eq!(message.id.to_string(), id);
    assert_eq!(message.body, body);
}

#[tokio::test]
async fn webhook_accepts_push_larger_than_axum_default_limit() {
    let base = tempfile::tempdir().unwrap();
    let (app, bus) = app(base.path());
    let mut subscription = bus.subscribe().unwrap();
    // A push touching many files: about 3 MiB of commit data.
    let commits: Vec<Value> = (0..3 * 1024)
        .map(|i| serde_json::json!({ "id": i, "message": "x".repeat(1024) }))
        .collect();
    let body = bytes::Bytes::from(
        serde_json::json!({
            "ref": "refs/heads/main",
            "after": "abc123",
            "repository": { "clone_url": "https://example/repo.git" },
            "commits": commits
        })
        .to_string(),
    );
    assert!(body.len() > 3 * 1024 * 1024);

    let response = app
        .oneshot(
            Request::post("/webhook")
                .header("X-Hub-Signature-256", sign(SECRET, &body).unwrap())
                .header("Content-Type", "application/json")
                .body(Body::from(body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let message = subscription.recv().await.unwrap();
    assert_eq!(message.body.len(), body.len());
}

#[tokio::test]
async fn webhook_body_limit_is_configurable() {
    let base = tempfile::tempdir().unwrap();
    let config = relay_config(base.path(), |s| s.gateway.max_body_bytes = 16);
    let bus = Arc::new(InMemoryBus::from_config(TOPIC, &config.bus));
    let app = api::router(Arc::new(AppState::new(Gateway::new(config, bus))));
    let body = push_payload("https://example/repo.git", "refs/heads/main", "abc123");

    let response = app
        .oneshot(
            Request::post("/webhook")
                .header("X-Hub-Signature-256", sign(SECRET, &body).unwrap())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn webhook_rejects_unsigned_push() {
    let base = tempfile::tempdir().unwrap();
    let (app, _bus) = app(base.path());
    let body = push_payload("https://example/repo.git", "refs/heads/main", "abc123");

    let response = app
        .oneshot(Request::post("/webhook").body(Body::from(body)).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert_eq!(json["message"], "Missing signature header");
    assert!(json.get("message_id").is_none());
}

#[tokio::test]
async fn webhook_reports_publish_failure() {
    let base = tempfile::tempdir().unwrap();
    let (app, bus) = app(base.path());
    // Dropping the only subscription closes the topic.
    drop(bus.subscribe());
    let body = push_payload("https://example/repo.git", "refs/heads/main", "abc123");

    let response = app
        .oneshot(
            Request::post("/webhook")
                .header("x-hub-signature-256", sign(SECRET, &body).unwrap())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = json_body(response).await;
    assert!(json["message"].as_str().unwrap().starts_with("Failed to publish event"));
}

#[tokio::test]
async fn root_reports_health() {
    let base = tempfile::tempdir().unwrap();
    let (app, _bus) = app(base.path());

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["topic"], TOPIC);
}
