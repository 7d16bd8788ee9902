//! HTTP/WebSocket API for the card room server.
//!
//! - [`auth`]: challenge/response authentication and session
//!   introspection
//! - [`admin`]: read-only queries and ban management, gated by a shared
//!   secret
//! - [`websocket`]: the persistent duplex game channel
//!
//! All game traffic flows through the WebSocket; HTTP carries only the
//! pre-game authentication handshake and the operator surface.

pub mod admin;
pub mod auth;
pub mod websocket;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use card_room::{
    auth::AuthManager,
    db::{Stores, TableId},
    session::CoordinatorHandle,
    TableHandle,
};
use std::{
    collections::HashMap,
    sync::{atomic::AtomicU64, Arc},
};
use tower_http::cors::CorsLayer;

/// Application state shared across all handlers and connections.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: AuthManager,
    pub coordinator: CoordinatorHandle,
    pub stores: Stores,
    pub tables: Arc<HashMap<TableId, TableHandle>>,
    pub admin_token: String,
    pub next_conn_id: Arc<AtomicU64>,
}

/// Build the complete router.
///
/// ```text
/// GET  /health                      - liveness (public)
/// POST /auth/challenge              - issue a one-use challenge
/// POST /auth/verify                 - verify a signed envelope
/// GET  /auth/session                - introspect a session token
/// GET  /ws?token=<session>          - game channel (token optional for observers)
/// GET  /admin/hands/{hand_id}       - hand by id (admin)
/// GET  /admin/players/{identity}    - player record (admin)
/// GET  /admin/players/{identity}/hands - hand list (admin)
/// GET  /admin/tables                - live table occupancy (admin)
/// GET  /admin/stats                 - aggregate counts (admin)
/// POST /admin/ban                   - ban identity or IP (admin)
/// POST /admin/unban                 - lift a ban (admin)
/// ```
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::list(origins))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/challenge", post(auth::create_challenge))
        .route("/auth/verify", post(auth::verify))
        .route("/auth/session", get(auth::session))
        .route("/ws", get(websocket::websocket_handler))
        .route("/admin/hands/{hand_id}", get(admin::hand_by_id))
        .route("/admin/players/{identity}", get(admin::player_record))
        .route("/admin/players/{identity}/hands", get(admin::player_hands))
        .route("/admin/tables", get(admin::table_list))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/ban", post(admin::ban))
        .route("/admin/unban", post(admin::unban))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
async fn health_check() -> &'static str {
    "OK"
}
