//! Authentication endpoints: challenge issue, envelope verification,
//! session introspection.

use super::AppState;
use crate::metrics;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use card_room::auth::{AuthError, SignedEvent};
use serde::Deserialize;
use serde_json::json;

/// `POST /auth/challenge` — issue a one-use challenge.
///
/// Response: `{"challenge_id": "...", "nonce": "<64 hex chars>"}`.
pub async fn create_challenge(State(state): State<AppState>) -> impl IntoResponse {
    match state.auth_manager.create_challenge().await {
        Ok(challenge) => (StatusCode::OK, Json(json!(challenge))),
        Err(err) => {
            tracing::error!("challenge issue failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.client_message()})),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub challenge_id: String,
    pub signed_event: SignedEvent,
}

/// `POST /auth/verify` — consume a challenge against a signed envelope.
///
/// Success yields `{"session_token", "identity", "profile"}`.
pub async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> impl IntoResponse {
    match state
        .auth_manager
        .verify(&request.challenge_id, &request.signed_event)
        .await
    {
        Ok(grant) => {
            metrics::auth_attempts_total(true);
            (StatusCode::OK, Json(json!(grant)))
        }
        Err(err) => {
            metrics::auth_attempts_total(false);
            let status = match err {
                AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, Json(json!({"error": err.client_message()})))
        }
    }
}

/// `GET /auth/session` — introspect the `x-session-token` header.
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let Some(token) = headers
        .get("x-session-token")
        .and_then(|v| v.to_str().ok())
    else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "missing x-session-token header"})),
        );
    };
    match state.auth_manager.session(token).await {
        Ok(profile) => (StatusCode::OK, Json(json!(profile))),
        Err(err) => {
            let status = match err {
                AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::UNAUTHORIZED,
            };
            (status, Json(json!({"error": err.client_message()})))
        }
    }
}
