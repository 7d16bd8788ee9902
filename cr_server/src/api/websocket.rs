//! WebSocket handler: the persistent duplex game channel.
//!
//! # Connection flow
//!
//! 1. Client connects via `GET /ws?token=<session_token>`; the token is
//!    optional — without one the connection can only observe.
//! 2. The connection registers with the session coordinator, which owns
//!    all identity/seat mapping from here on.
//! 3. A send task drains the coordinator's per-connection event channel
//!    into the socket; the receive loop parses client commands and
//!    forwards them, behind burst and sustained rate limits.
//! 4. On disconnect the coordinator is told once; reconnection grace
//!    and sit-out escalation are its business, not the transport's.

use super::AppState;
use crate::metrics;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use card_room::session::{
    ClientCommand, CoordinatorMessage, ErrorKind, RateLimiter, ServerEvent,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Upgrade to the game channel. An invalid token is refused outright; a
/// missing token produces an observer-only connection.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let identity = match &query.token {
        Some(token) => match state.auth_manager.session(token).await {
            Ok(record) => Some((
                card_room::PlayerId::new(record.identity),
                record.handle,
            )),
            Err(_) => {
                return (StatusCode::UNAUTHORIZED, "invalid session token").into_response();
            }
        },
        None => None,
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, addr, state))
}

async fn handle_socket(
    socket: WebSocket,
    identity: Option<(card_room::PlayerId, String)>,
    addr: SocketAddr,
    state: AppState,
) {
    let conn = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (mut ws_sender, mut ws_receiver) = socket.split();
    metrics::websocket_connections_total();

    tracing::info!(conn, peer = %addr, observer = identity.is_none(), "websocket connected");

    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(64);
    let error_tx = event_tx.clone();
    state
        .coordinator
        .send(CoordinatorMessage::Connect {
            conn,
            identity,
            ip: addr.ip().to_string(),
            sender: event_tx,
        })
        .await;

    // Drain coordinator events into the socket.
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    tracing::error!("failed to serialize server event: {err}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut burst_limiter = RateLimiter::burst();
    let mut sustained_limiter = RateLimiter::sustained();

    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                metrics::websocket_messages_received();
                if !burst_limiter.check() || !sustained_limiter.check() {
                    metrics::rate_limit_hits_total("ws");
                    tracing::warn!(conn, "rate limit exceeded, dropping message");
                    continue;
                }
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        state
                            .coordinator
                            .send(CoordinatorMessage::Command { conn, command })
                            .await;
                    }
                    Err(err) => {
                        tracing::debug!(conn, "unparseable client message: {err}");
                        let _ = error_tx
                            .send(ServerEvent::Error {
                                kind: ErrorKind::InvalidArgument,
                                message: "malformed message".to_string(),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                tracing::debug!(conn, "websocket error: {err}");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    state
        .coordinator
        .send(CoordinatorMessage::Disconnected { conn })
        .await;
    tracing::info!(conn, "websocket disconnected");
}
