//! The session coordinator.
//!
//! A single actor owning every connection↔identity↔seat mapping across
//! all tables in the process. Table actors feed their outbound streams
//! into the coordinator, which personalises snapshots and log lines per
//! connection and fans them out in order: a connection's channel is
//! FIFO, and log lines are forwarded before the snapshot that reflects
//! them, so no stale view can overtake a newer one.

use super::{
    messages::{ClientCommand, ErrorKind, ServerEvent},
    rate_limiter::RateLimiter,
    views,
};
use crate::{
    db::{AbuseStore, PlayerStore, Stores, TableId},
    game::{
        entities::{Chips, Millis},
        history::LogLine,
        ActionError, PlayerId,
    },
    table::{TableBroadcast, TableHandle, TableMessage, TableOutbound},
};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Transport connection identifier, unique per process lifetime.
pub type ConnId = u64;

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub default_buy_in: Chips,
    pub reconnect_swap_grace_ms: Millis,
    pub disconnect_grace_ms: Millis,
    pub chat_max_len: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            default_buy_in: 10_000,
            reconnect_swap_grace_ms: 10_000,
            disconnect_grace_ms: 60_000,
            chat_max_len: 280,
        }
    }
}

#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A transport connected, already authenticated (or not, for
    /// observers-to-be).
    Connect {
        conn: ConnId,
        identity: Option<(PlayerId, String)>,
        ip: String,
        sender: mpsc::Sender<ServerEvent>,
    },
    /// A parsed client command from a connection.
    Command { conn: ConnId, command: ClientCommand },
    /// The transport dropped.
    Disconnected { conn: ConnId },
    /// A table came up (or went away with `handle = None`).
    RegisterTable {
        table_id: TableId,
        handle: Option<TableHandle>,
    },
    /// Scheduled: the 10 s identity-map swap grace elapsed.
    SwapGraceElapsed { id: PlayerId, conn: ConnId },
    /// Scheduled: the 60 s disconnect grace elapsed.
    DisconnectGraceElapsed {
        id: PlayerId,
        conn: ConnId,
        table_id: TableId,
    },
}

struct Session {
    identity: Option<PlayerId>,
    handle: String,
    ip: String,
    sender: mpsc::Sender<ServerEvent>,
    table: Option<TableId>,
    seated: bool,
}

#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMessage>,
    table_tx: mpsc::Sender<TableBroadcast>,
}

impl CoordinatorHandle {
    pub async fn send(&self, message: CoordinatorMessage) {
        if self.tx.send(message).await.is_err() {
            log::warn!("coordinator inbox closed");
        }
    }

    /// The channel table actors broadcast into.
    pub fn table_outbound(&self) -> mpsc::Sender<TableBroadcast> {
        self.table_tx.clone()
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    stores: Stores,
    inbox: mpsc::Receiver<CoordinatorMessage>,
    self_tx: mpsc::Sender<CoordinatorMessage>,
    from_tables: mpsc::Receiver<TableBroadcast>,
    tables: HashMap<TableId, TableHandle>,
    sessions: HashMap<ConnId, Session>,
    by_identity: HashMap<PlayerId, ConnId>,
    rooms: HashMap<TableId, HashSet<ConnId>>,
    join_limits: HashMap<PlayerId, RateLimiter>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, stores: Stores) -> (Self, CoordinatorHandle) {
        let (tx, inbox) = mpsc::channel(256);
        let (table_tx, from_tables) = mpsc::channel(256);
        let handle = CoordinatorHandle {
            tx: tx.clone(),
            table_tx,
        };
        let coordinator = Self {
            config,
            stores,
            inbox,
            self_tx: tx,
            from_tables,
            tables: HashMap::new(),
            sessions: HashMap::new(),
            by_identity: HashMap::new(),
            rooms: HashMap::new(),
            join_limits: HashMap::new(),
        };
        (coordinator, handle)
    }

    pub async fn run(mut self) {
        log::info!("session coordinator starting");
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => break,
                    }
                }
                broadcast = self.from_tables.recv() => {
                    match broadcast {
                        Some((table_id, outbound)) => {
                            self.handle_table_outbound(table_id, outbound).await;
                        }
                        None => break,
                    }
                }
            }
        }
        log::info!("session coordinator stopped");
    }

    async fn handle_message(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Connect {
                conn,
                identity,
                ip,
                sender,
            } => {
                let (identity, handle) = match identity {
                    Some((id, handle)) => (Some(id), handle),
                    None => (None, observer_pseudonym()),
                };
                if let Some(id) = &identity {
                    // Latest transport wins the identity mapping.
                    self.by_identity.insert(id.clone(), conn);
                }
                self.sessions.insert(
                    conn,
                    Session {
                        identity,
                        handle,
                        ip,
                        sender,
                        table: None,
                        seated: false,
                    },
                );
            }

            CoordinatorMessage::Command { conn, command } => {
                self.handle_command(conn, command).await;
            }

            CoordinatorMessage::Disconnected { conn } => {
                self.handle_disconnect(conn).await;
            }

            CoordinatorMessage::RegisterTable { table_id, handle } => match handle {
                Some(handle) => {
                    self.tables.insert(table_id, handle);
                }
                None => {
                    self.tables.remove(&table_id);
                    self.rooms.remove(&table_id);
                }
            },

            CoordinatorMessage::SwapGraceElapsed { id, conn } => {
                // Idempotent: only drop the mapping if it still names
                // the dead transport.
                if self.by_identity.get(&id).copied() == Some(conn)
                    && !self.sessions.contains_key(&conn)
                {
                    self.by_identity.remove(&id);
                }
            }

            CoordinatorMessage::DisconnectGraceElapsed {
                id,
                conn,
                table_id,
            } => {
                let reconnected = self
                    .by_identity
                    .get(&id)
                    .is_some_and(|c| *c != conn && self.sessions.contains_key(c));
                if !reconnected {
                    log::info!("auto-sitting-out disconnected player {}", id.short());
                    if let Some(table) = self.tables.get(&table_id) {
                        let _ = table
                            .send(TableMessage::ForceSitOut { id: id.clone() })
                            .await;
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, conn: ConnId, command: ClientCommand) {
        if !self.sessions.contains_key(&conn) {
            return;
        }
        match command {
            ClientCommand::JoinTable {
                table_id,
                seat,
                buy_in,
            } => self.join_table(conn, table_id, seat, buy_in).await,
            ClientCommand::ObserveTable { table_id } => self.observe_table(conn, table_id).await,
            ClientCommand::Action { action } => {
                self.forward_seated(conn, |id, respond| TableMessage::TakeAction {
                    id,
                    action,
                    respond,
                })
                .await;
            }
            ClientCommand::SitOut => {
                self.forward_seated(conn, |id, respond| TableMessage::SitOut { id, respond })
                    .await;
            }
            ClientCommand::SitBackIn => {
                self.forward_seated(conn, |id, respond| TableMessage::SitBackIn { id, respond })
                    .await;
            }
            ClientCommand::Rebuy { buy_in } => {
                self.forward_seated_chips(conn, |id, respond| TableMessage::Rebuy {
                    id,
                    buy_in,
                    respond,
                })
                .await;
            }
            ClientCommand::LeaveTable => {
                self.forward_seated(conn, |id, respond| TableMessage::Leave { id, respond })
                    .await;
                if let Some(session) = self.sessions.get_mut(&conn) {
                    session.seated = false;
                }
            }
            ClientCommand::ChatMessage { text } => self.chat(conn, text).await,
        }
    }

    /// Seat assignment: ban gate, rate-limit gate, reconnection swap,
    /// then a fresh seat.
    async fn join_table(
        &mut self,
        conn: ConnId,
        table_id: TableId,
        seat: Option<usize>,
        buy_in: Option<Chips>,
    ) {
        let Some((id, handle, ip)) = self.sessions.get(&conn).and_then(|s| {
            s.identity
                .clone()
                .map(|id| (id, s.handle.clone(), s.ip.clone()))
        }) else {
            self.send_auth_error(conn, "authenticate before taking a seat")
                .await;
            return;
        };

        match self.stores.players.ban_reason(&id).await {
            Ok(Some(reason)) => {
                let _ = self
                    .stores
                    .abuse
                    .record_abuse(Some(&id), &ip, "join while banned")
                    .await;
                self.send_error(conn, ErrorKind::Unauthorized, &format!("banned: {reason}"))
                    .await;
                return;
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("ban check failed: {e}");
                self.send_error(conn, ErrorKind::Internal, "internal server error")
                    .await;
                return;
            }
        }
        if self.stores.players.is_ip_banned(&ip).await.unwrap_or(false) {
            let _ = self
                .stores
                .abuse
                .record_abuse(Some(&id), &ip, "join from banned ip")
                .await;
            self.send_error(conn, ErrorKind::Unauthorized, "address banned")
                .await;
            return;
        }

        let allowed = self
            .join_limits
            .entry(id.clone())
            .or_insert_with(RateLimiter::joins)
            .check();
        if !allowed {
            self.send_error(conn, ErrorKind::RateLimited, "slow down")
                .await;
            return;
        }

        let Some(table) = self.tables.get(&table_id).cloned() else {
            self.send_error(conn, ErrorKind::TableNotFound, "no such table")
                .await;
            return;
        };

        let (tx, rx) = oneshot::channel();
        let message = TableMessage::Join {
            id: id.clone(),
            handle,
            preferred_seat: seat,
            buy_in: buy_in.unwrap_or(self.config.default_buy_in),
            respond: tx,
        };
        if table.send(message).await.is_err() {
            self.send_error(conn, ErrorKind::TableNotFound, "table closed")
                .await;
            return;
        }
        match rx.await {
            Ok(Ok(assigned)) => {
                self.seat_session(conn, table_id, assigned).await;
            }
            Ok(Err(ActionError::AlreadySeated { seat: existing })) => {
                // Reconnection: swap the transport under the identity
                // and pick the hand back up.
                self.swap_transport(&id, conn).await;
                let _ = table
                    .send(TableMessage::SetDisconnected {
                        id: id.clone(),
                        disconnected: false,
                    })
                    .await;
                self.seat_session(conn, table_id, existing).await;
            }
            Ok(Err(err)) => {
                self.send_error(conn, ErrorKind::from(&err), &err.to_string())
                    .await;
            }
            Err(_) => {
                self.send_error(conn, ErrorKind::Internal, "table did not respond")
                    .await;
            }
        }
    }

    /// Bind a connection to its seat and push the current state.
    async fn seat_session(&mut self, conn: ConnId, table_id: TableId, seat: usize) {
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.table = Some(table_id);
            session.seated = true;
        }
        self.rooms.entry(table_id).or_default().insert(conn);
        self.send_to(conn, ServerEvent::SeatAssigned { table_id, seat })
            .await;
        self.push_snapshot_to(conn, table_id).await;
    }

    async fn observe_table(&mut self, conn: ConnId, table_id: TableId) {
        if !self.tables.contains_key(&table_id) {
            self.send_error(conn, ErrorKind::TableNotFound, "no such table")
                .await;
            return;
        }
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.table = Some(table_id);
        }
        self.rooms.entry(table_id).or_default().insert(conn);
        self.push_snapshot_to(conn, table_id).await;
    }

    async fn push_snapshot_to(&mut self, conn: ConnId, table_id: TableId) {
        let Some(table) = self.tables.get(&table_id) else {
            return;
        };
        if let Some(snapshot) = table.snapshot().await {
            let viewer = self
                .sessions
                .get(&conn)
                .and_then(|s| s.identity.clone());
            let view = views::personalise(&snapshot, viewer.as_ref());
            self.send_to(conn, ServerEvent::GameState { view }).await;
        }
    }

    /// Forward a seated-player command, reporting errors to the sender
    /// only.
    async fn forward_seated<F>(&mut self, conn: ConnId, build: F)
    where
        F: FnOnce(PlayerId, oneshot::Sender<Result<(), ActionError>>) -> TableMessage,
    {
        let Some((id, table_id)) = self.seated_identity(conn) else {
            self.send_error(conn, ErrorKind::NotInHand, "not seated at a table")
                .await;
            return;
        };
        let Some(table) = self.tables.get(&table_id).cloned() else {
            self.send_error(conn, ErrorKind::TableNotFound, "table closed")
                .await;
            return;
        };
        let (tx, rx) = oneshot::channel();
        if table.send(build(id, tx)).await.is_err() {
            self.send_error(conn, ErrorKind::TableNotFound, "table closed")
                .await;
            return;
        }
        if let Ok(Err(err)) = rx.await {
            self.send_error(conn, ErrorKind::from(&err), &err.to_string())
                .await;
        }
    }

    async fn forward_seated_chips<F>(&mut self, conn: ConnId, build: F)
    where
        F: FnOnce(PlayerId, oneshot::Sender<Result<Chips, ActionError>>) -> TableMessage,
    {
        let Some((id, table_id)) = self.seated_identity(conn) else {
            self.send_error(conn, ErrorKind::NotInHand, "not seated at a table")
                .await;
            return;
        };
        let Some(table) = self.tables.get(&table_id).cloned() else {
            self.send_error(conn, ErrorKind::TableNotFound, "table closed")
                .await;
            return;
        };
        let (tx, rx) = oneshot::channel();
        if table.send(build(id, tx)).await.is_err() {
            self.send_error(conn, ErrorKind::TableNotFound, "table closed")
                .await;
            return;
        }
        if let Ok(Err(err)) = rx.await {
            self.send_error(conn, ErrorKind::from(&err), &err.to_string())
                .await;
        }
    }

    fn seated_identity(&self, conn: ConnId) -> Option<(PlayerId, TableId)> {
        let session = self.sessions.get(&conn)?;
        Some((session.identity.clone()?, session.table?))
    }

    /// Chat is a plain broadcast: length-clamped, tagged by role, never
    /// touching game state.
    async fn chat(&mut self, conn: ConnId, text: String) {
        let Some(session) = self.sessions.get(&conn) else {
            return;
        };
        let Some(table_id) = session.table else {
            self.send_error(conn, ErrorKind::InvalidArgument, "join or observe a table first")
                .await;
            return;
        };
        let mut text = text;
        text.truncate(self.config.chat_max_len);
        let event = ServerEvent::Chat {
            from: session.handle.clone(),
            observer: !session.seated,
            text,
        };
        self.broadcast_to_room(table_id, event).await;
    }

    async fn handle_disconnect(&mut self, conn: ConnId) {
        let Some(session) = self.sessions.remove(&conn) else {
            return;
        };
        if let Some(table_id) = session.table {
            if let Some(room) = self.rooms.get_mut(&table_id) {
                room.remove(&conn);
            }
        }
        let Some(id) = session.identity else {
            return;
        };
        if self.by_identity.get(&id).copied() != Some(conn) {
            // A newer transport already owns this identity.
            return;
        }
        // Keep the identity mapping alive for the swap grace so an
        // in-flight reconnection can take it over.
        self.schedule(
            self.config.reconnect_swap_grace_ms,
            CoordinatorMessage::SwapGraceElapsed {
                id: id.clone(),
                conn,
            },
        );
        if session.seated {
            if let Some(table_id) = session.table {
                if let Some(table) = self.tables.get(&table_id) {
                    let _ = table
                        .send(TableMessage::SetDisconnected {
                            id: id.clone(),
                            disconnected: true,
                        })
                        .await;
                }
                self.schedule(
                    self.config.disconnect_grace_ms,
                    CoordinatorMessage::DisconnectGraceElapsed {
                        id,
                        conn,
                        table_id,
                    },
                );
            }
        }
    }

    /// Point the identity at a new transport; drop the old session.
    async fn swap_transport(&mut self, id: &PlayerId, new_conn: ConnId) {
        if let Some(old_conn) = self.by_identity.insert(id.clone(), new_conn) {
            if old_conn != new_conn {
                if let Some(old) = self.sessions.remove(&old_conn) {
                    if let Some(table_id) = old.table {
                        if let Some(room) = self.rooms.get_mut(&table_id) {
                            room.remove(&old_conn);
                        }
                    }
                }
            }
        }
    }

    async fn handle_table_outbound(&mut self, table_id: TableId, outbound: TableOutbound) {
        match outbound {
            TableOutbound::Snapshot(snapshot) => {
                let conns = self.room_conns(table_id);
                for conn in conns {
                    let viewer = self
                        .sessions
                        .get(&conn)
                        .and_then(|s| s.identity.clone());
                    let view = views::personalise(&snapshot, viewer.as_ref());
                    self.send_to(conn, ServerEvent::GameState { view }).await;
                }
            }
            TableOutbound::ActionTimerStart {
                seat, duration_ms, ..
            } => {
                self.broadcast_to_room(table_id, ServerEvent::ActionTimerStart { seat, duration_ms })
                    .await;
            }
            TableOutbound::TimeBankStart {
                seat, remaining_ms, ..
            } => {
                self.broadcast_to_room(table_id, ServerEvent::TimeBankStart { seat, remaining_ms })
                    .await;
            }
            TableOutbound::LogLines(lines) => {
                self.fan_out_log(table_id, &lines).await;
            }
            TableOutbound::HandComplete {
                record,
                personal_logs,
            } => {
                for (id, history) in personal_logs {
                    if let Some(conn) = self.live_conn(&id) {
                        self.send_to(
                            conn,
                            ServerEvent::HandComplete {
                                hand_no: record.hand_no,
                                history,
                            },
                        )
                        .await;
                    }
                }
            }
            TableOutbound::PlayerLeft { id, .. } => {
                if let Some(conn) = self.live_conn(&id) {
                    if let Some(session) = self.sessions.get_mut(&conn) {
                        session.seated = false;
                    }
                }
            }
            TableOutbound::ProfileUpdated { id, chips } => {
                if let Some(conn) = self.live_conn(&id) {
                    self.send_to(conn, ServerEvent::ProfileUpdated { chips }).await;
                }
            }
        }
    }

    /// Public lines go to the whole room; private lines only to the
    /// owning identity's transport.
    async fn fan_out_log(&mut self, table_id: TableId, lines: &[LogLine]) {
        let conns = self.room_conns(table_id);
        for conn in conns {
            let viewer = self
                .sessions
                .get(&conn)
                .and_then(|s| s.identity.clone());
            let visible: Vec<String> = lines
                .iter()
                .filter(|l| match viewer.as_ref() {
                    Some(id) => l.visible_to(id),
                    None => matches!(l.visibility, crate::game::Visibility::Public),
                })
                .map(|l| l.text.clone())
                .collect();
            if !visible.is_empty() {
                self.send_to(conn, ServerEvent::HandLog { lines: visible })
                    .await;
            }
        }
    }

    fn room_conns(&self, table_id: TableId) -> Vec<ConnId> {
        self.rooms
            .get(&table_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default()
    }

    fn live_conn(&self, id: &PlayerId) -> Option<ConnId> {
        let conn = self.by_identity.get(id)?;
        self.sessions.contains_key(conn).then_some(*conn)
    }

    async fn broadcast_to_room(&mut self, table_id: TableId, event: ServerEvent) {
        let conns = self.room_conns(table_id);
        for conn in conns {
            self.send_to(conn, event.clone()).await;
        }
    }

    /// Non-blocking per-connection delivery; a full client buffer drops
    /// the event rather than stalling every other table and connection.
    async fn send_to(&mut self, conn: ConnId, event: ServerEvent) {
        let Some(session) = self.sessions.get(&conn) else {
            return;
        };
        match session.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("connection {conn}: outbound buffer full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.sessions.remove(&conn);
            }
        }
    }

    async fn send_error(&mut self, conn: ConnId, kind: ErrorKind, message: &str) {
        self.send_to(
            conn,
            ServerEvent::Error {
                kind,
                message: message.to_string(),
            },
        )
        .await;
    }

    async fn send_auth_error(&mut self, conn: ConnId, message: &str) {
        self.send_to(
            conn,
            ServerEvent::AuthError {
                message: message.to_string(),
            },
        )
        .await;
    }

    fn schedule(&self, delay_ms: Millis, message: CoordinatorMessage) {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(message).await;
        });
    }
}

fn observer_pseudonym() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("railbird-{}", &id[..6])
}
