//! Webhook endpoint tests
//!
//! Exercise the full router without a live database: the pool is lazy and
//! every path under test (signature rejection, unrecognized events,
//! malformed payloads) completes before any query would run.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bettersaas_api::{create_router, AppState, Config};
use bettersaas_billing::StripeConfig;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::postgres::PgPoolOptions;
use tower::util::ServiceExt;

const SECRET: &str = "whsec_endpoint_test";

fn test_router() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost:1/unused")
        .unwrap();
    let config = Config {
        database_url: "postgres://localhost:1/unused".to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        allowed_origins: vec![],
    };
    create_router(AppState::new(pool, config, StripeConfig::new(SECRET)))
}

fn sign(payload: &[u8], secret: &str) -> String {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

fn webhook_request(body: String, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("stripe-signature", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = test_router();
    let response = app
        .oneshot(webhook_request("{}".to_string(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let app = test_router();
    let payload = serde_json::json!({
        "id": "evt_1",
        "type": "customer.subscription.updated",
        "data": {"object": {}}
    })
    .to_string();

    // Signed with the wrong secret: equivalent to a tampered v1 value.
    let signature = sign(payload.as_bytes(), "whsec_attacker");
    let response = app
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json.get("error").is_some());
}

#[tokio::test]
async fn unrecognized_event_type_is_acknowledged() {
    let app = test_router();
    let payload = serde_json::json!({
        "id": "evt_2",
        "type": "checkout.session.expired",
        "data": {"object": {"id": "cs_1"}}
    })
    .to_string();

    let signature = sign(payload.as_bytes(), SECRET);
    let response = app
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    // 200 so Stripe does not retry; the lazy pool guarantees no write
    // happened (any query would have failed the request).
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], serde_json::json!(true));
}

#[tokio::test]
async fn malformed_payload_for_recognized_type_is_a_server_error() {
    let app = test_router();
    // Recognized type but data.object is missing required fields.
    let payload = serde_json::json!({
        "id": "evt_3",
        "type": "customer.subscription.updated",
        "data": {"object": {"id": "sub_1"}}
    })
    .to_string();

    let signature = sign(payload.as_bytes(), SECRET);
    let response = app
        .oneshot(webhook_request(payload, Some(signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_check_responds() {
    let app = test_router();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}
