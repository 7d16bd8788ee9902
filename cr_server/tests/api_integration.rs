//! Router-level integration tests: health, admin gating, and the
//! challenge/verify authentication handshake, all against in-memory
//! stores.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use card_room::{
    auth::{AuthManager, PermissiveVerifier, AUTH_EVENT_KIND},
    db::{PlayerStore, Stores},
    session::{Coordinator, CoordinatorConfig},
};
use cr_server::api::{create_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    sync::{atomic::AtomicU64, Arc},
};
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "test-admin-token-0123456789abcdef";

async fn test_app() -> (Router, Stores) {
    let stores = Stores::in_memory();
    let auth_manager = AuthManager::new(stores.clone(), Arc::new(PermissiveVerifier));
    let (coordinator, handle) = Coordinator::new(CoordinatorConfig::default(), stores.clone());
    tokio::spawn(coordinator.run());
    let state = AppState {
        auth_manager,
        coordinator: handle,
        stores: stores.clone(),
        tables: Arc::new(HashMap::new()),
        admin_token: ADMIN_TOKEN.to_string(),
        next_conn_id: Arc::new(AtomicU64::new(1)),
    };
    (create_router(state, &[]), stores)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_requires_token() {
    let (app, _) = test_app().await;
    let response = app
        .clone()
        .oneshot(Request::get("/admin/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::get("/admin/stats")
                .header("x-admin-token", ADMIN_TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["hands"], 0);
    assert_eq!(body["tables"], 0);
}

#[tokio::test]
async fn wrong_admin_token_rejected() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/admin/stats")
                .header("x-admin-token", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn challenge_verify_session_round_trip() {
    let (app, _) = test_app().await;

    // 1. Issue a challenge.
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/challenge")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let challenge = body_json(response).await;
    let challenge_id = challenge["challenge_id"].as_str().unwrap().to_string();
    let nonce = challenge["nonce"].as_str().unwrap().to_string();
    assert_eq!(nonce.len(), 64);

    // 2. Verify a signed envelope carrying the nonce.
    let event = json!({
        "pubkey": "ab".repeat(32),
        "created_at": chrono_now(),
        "kind": AUTH_EVENT_KIND,
        "tags": [["challenge", nonce]],
        "content": r#"{"handle":"tester"}"#,
        "id": "",
        "sig": "",
    });
    let response = app
        .clone()
        .oneshot(
            Request::post("/auth/verify")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"challenge_id": challenge_id, "signed_event": event}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let grant = body_json(response).await;
    let token = grant["session_token"].as_str().unwrap().to_string();
    assert_eq!(grant["profile"]["handle"], "tester");

    // 3. Introspect the session.
    let response = app
        .oneshot(
            Request::get("/auth/session")
                .header("x-session-token", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["handle"], "tester");
}

#[tokio::test]
async fn bad_session_token_is_unauthorized() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/auth/session")
                .header("x-session-token", "nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ban_and_unban_round_trip() {
    let (app, stores) = test_app().await;
    let response = app
        .clone()
        .oneshot(
            Request::post("/admin/ban")
                .header("x-admin-token", ADMIN_TOKEN)
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"identity": "cheater", "reason": "collusion"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reason = stores
        .players
        .ban_reason(&card_room::PlayerId::new("cheater"))
        .await
        .unwrap();
    assert!(reason.unwrap().contains("collusion"));

    let response = app
        .oneshot(
            Request::post("/admin/unban")
                .header("x-admin-token", ADMIN_TOKEN)
                .header("content-type", "application/json")
                .body(Body::from(json!({"identity": "cheater"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let reason = stores
        .players
        .ban_reason(&card_room::PlayerId::new("cheater"))
        .await
        .unwrap();
    assert!(reason.is_none());
}

fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
