//! Admin/query surface: read-only queries over persisted state plus
//! ban management. Every endpoint is gated by the `x-admin-token`
//! shared secret; mismatches get a bare 401 and a security log line.

use super::AppState;
use crate::logging;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use card_room::{
    db::{HandStore, PlayerStore},
    game::PlayerId,
};
use serde::Deserialize;
use serde_json::json;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let presented = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented == state.admin_token {
        Ok(())
    } else {
        logging::log_security_event("admin_auth_failure", None, None, "bad admin token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// `GET /admin/hands/{hand_id}`
pub async fn hand_by_id(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(hand_id): Path<i64>,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    match state.stores.hands.hand_by_id(hand_id).await {
        Ok(Some((hand, players))) => {
            Ok(Json(json!({"hand": hand, "players": players})))
        }
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::error!("hand query failed: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HandListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /admin/players/{identity}/hands?limit=N`
pub async fn player_hands(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identity): Path<String>,
    Query(query): Query<HandListQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    let limit = query.limit.clamp(1, 500);
    match state
        .stores
        .hands
        .hands_by_identity(&PlayerId::new(identity), limit)
        .await
    {
        Ok(hands) => Ok(Json(json!({"hands": hands}))),
        Err(err) => {
            tracing::error!("hand list query failed: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /admin/players/{identity}`
pub async fn player_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(identity): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    match state.stores.players.player(&PlayerId::new(identity)).await {
        Ok(Some(record)) => Ok(Json(json!(record))),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            tracing::error!("player query failed: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `GET /admin/tables` — live occupancy straight from the actors.
pub async fn table_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    let mut tables = Vec::new();
    for (table_id, handle) in state.tables.iter() {
        if let Some(snapshot) = handle.snapshot().await {
            let occupied = snapshot.seats.iter().filter(|s| s.is_some()).count();
            tables.push(json!({
                "table_id": table_id,
                "phase": snapshot.phase,
                "hand_no": snapshot.hand_no,
                "occupied_seats": occupied,
                "num_seats": snapshot.seats.len(),
                "pot": snapshot.pot,
                "small_blind": snapshot.small_blind,
                "big_blind": snapshot.big_blind,
            }));
        }
    }
    Ok(Json(json!({"tables": tables})))
}

/// `GET /admin/stats` — aggregate counts.
pub async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    let hands = state.stores.hands.hand_count().await.unwrap_or(0);
    let players = state.stores.players.player_count().await.unwrap_or(0);
    Ok(Json(json!({
        "hands": hands,
        "players": players,
        "tables": state.tables.len(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub identity: Option<String>,
    pub ip: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /admin/ban` — ban by identity, IP, or both.
pub async fn ban(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BanRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    if request.identity.is_none() && request.ip.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let reason = request.reason.as_deref().unwrap_or("banned by admin");
    if let Some(identity) = &request.identity {
        state
            .stores
            .players
            .ban(&PlayerId::new(identity.clone()), reason, "admin")
            .await
            .map_err(|err| {
                tracing::error!("ban failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        logging::log_security_event("ban", Some(identity), None, reason);
    }
    if let Some(ip) = &request.ip {
        state
            .stores
            .players
            .ban_ip(ip, reason, "admin")
            .await
            .map_err(|err| {
                tracing::error!("ip ban failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
        logging::log_security_event("ip_ban", None, Some(ip), reason);
    }
    Ok(Json(json!({"status": "ok"})))
}

/// `POST /admin/unban` — lift identity and/or IP bans.
pub async fn unban(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BanRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    require_admin(&state, &headers)?;
    if request.identity.is_none() && request.ip.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(identity) = &request.identity {
        state
            .stores
            .players
            .unban(&PlayerId::new(identity.clone()))
            .await
            .map_err(|err| {
                tracing::error!("unban failed: {err}");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
    }
    if let Some(ip) = &request.ip {
        state.stores.players.unban_ip(ip).await.map_err(|err| {
            tracing::error!("ip unban failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    }
    Ok(Json(json!({"status": "ok"})))
}
