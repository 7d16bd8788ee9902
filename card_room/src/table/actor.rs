//! Table actor: one tokio task owning one table.
//!
//! All inputs — transport commands, timer expiries, scheduled steps —
//! arrive through a single ordered inbox, so no two operations on a
//! table's state ever run concurrently. Every scheduled effect posts a
//! message back to the same inbox carrying the token it was armed with;
//! the handlers re-validate before acting, which makes stale callbacks
//! no-ops even without cancellation.

use super::{
    clock::ActionClock,
    messages::{TableBroadcast, TableMessage, TableOutbound},
};
use crate::{
    db::{HandStore, PlayerStore, Stores, TableId},
    game::{
        entities::Millis,
        table::{Table, TableConfig},
        PlayerId, TableEvent,
    },
};
use rand::rngs::OsRng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::{sync::mpsc, sync::oneshot, task::JoinHandle};

/// Handle for sending messages to a table actor.
#[derive(Clone, Debug)]
pub struct TableHandle {
    sender: mpsc::Sender<TableMessage>,
    table_id: TableId,
}

impl TableHandle {
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub async fn send(&self, message: TableMessage) -> Result<(), crate::game::ActionError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| crate::game::ActionError::TableClosed)
    }

    pub async fn snapshot(&self) -> Option<crate::game::TableSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(TableMessage::GetSnapshot { respond: tx }).await.ok()?;
        rx.await.ok()
    }

    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(TableMessage::Close { respond: tx }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

/// The actor. Create with [`TableActor::new`], then `tokio::spawn` its
/// [`run`](TableActor::run) future.
pub struct TableActor {
    id: TableId,
    table: Table,
    inbox: mpsc::Receiver<TableMessage>,
    self_tx: mpsc::Sender<TableMessage>,
    outbound: mpsc::Sender<TableBroadcast>,
    stores: Stores,
    clock: ActionClock,
    hand_start_timer: Option<JoinHandle<()>>,
    runout_timer: Option<JoinHandle<()>>,
    kick_timers: HashMap<PlayerId, (u64, JoinHandle<()>)>,
    kick_generation: u64,
    closed: bool,
}

impl TableActor {
    pub fn new(
        id: TableId,
        config: TableConfig,
        stores: Stores,
        outbound: mpsc::Sender<TableBroadcast>,
    ) -> (Self, TableHandle) {
        let table = Table::new(config, OsRng);
        Self::with_table(id, table, stores, outbound)
    }

    /// Construction with a pre-built table, for deterministic tests.
    pub fn with_table(
        id: TableId,
        table: Table,
        stores: Stores,
        outbound: mpsc::Sender<TableBroadcast>,
    ) -> (Self, TableHandle) {
        let (sender, inbox) = mpsc::channel(128);
        let handle = TableHandle {
            sender: sender.clone(),
            table_id: id,
        };
        let actor = Self {
            id,
            table,
            inbox,
            self_tx: sender,
            outbound,
            stores,
            clock: ActionClock::new(),
            hand_start_timer: None,
            runout_timer: None,
            kick_timers: HashMap::new(),
            kick_generation: 0,
            closed: false,
        };
        (actor, handle)
    }

    /// Run the actor event loop until closed or all handles drop.
    pub async fn run(mut self) {
        log::info!("table {} starting", self.id);
        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;
            if self.closed {
                break;
            }
        }
        self.teardown();
        log::info!("table {} closed", self.id);
    }

    async fn handle_message(&mut self, message: TableMessage) {
        match message {
            TableMessage::Join {
                id,
                handle,
                preferred_seat,
                buy_in,
                respond,
            } => {
                let result = self
                    .table
                    .seat_player(id.clone(), handle, preferred_seat, buy_in);
                if let Ok(seat) = result {
                    let chips = self
                        .table
                        .player(seat)
                        .map(|p| p.stack as i64)
                        .unwrap_or(0);
                    if let Err(e) = self.stores.players.set_chips(&id, chips).await {
                        log::error!("table {}: chip persist failed on join: {e}", self.id);
                    }
                }
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::Leave { id, respond } => {
                let result = self.table.remove_player(&id);
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::TakeAction {
                id,
                action,
                respond,
            } => {
                // Deduct any time-bank spend before the action mutates
                // state, then let the clock re-sync on the token bump.
                if self.clock.in_bank() && self.clock.matches(self.table.turn_token()) {
                    if let Some(elapsed) = self.clock.take_bank_elapsed_ms() {
                        self.table.burn_time_bank(elapsed);
                    }
                }
                let result = self.table.apply_action(&id, action);
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::SitOut { id, respond } => {
                let result = self.table.sit_out(&id);
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::SitBackIn { id, respond } => {
                let result = self.table.sit_back_in(&id);
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::Rebuy {
                id,
                buy_in,
                respond,
            } => {
                let result = self.table.rebuy(&id, buy_in);
                let _ = respond.send(result);
                self.after_mutation().await;
            }

            TableMessage::SetDisconnected { id, disconnected } => {
                self.table.set_disconnected(&id, disconnected);
                self.after_mutation().await;
            }

            TableMessage::ForceSitOut { id } => {
                if let Err(e) = self.table.force_sit_out(&id) {
                    log::debug!("table {}: force sit-out skipped: {e}", self.id);
                }
                self.after_mutation().await;
            }

            TableMessage::GetSnapshot { respond } => {
                let _ = respond.send(self.table.snapshot());
            }

            TableMessage::HandStartElapsed => {
                self.hand_start_timer = None;
                self.table.begin_hand();
                self.after_mutation().await;
            }

            TableMessage::BaseTimerElapsed { token } => {
                self.on_base_timer(token).await;
            }

            TableMessage::BankTimerElapsed { token } => {
                self.on_bank_timer(token).await;
            }

            TableMessage::RunOutElapsed { hand_no } => {
                if self.table.hand_no() == hand_no {
                    self.table.runout_step();
                    self.after_mutation().await;
                }
            }

            TableMessage::KickElapsed { id, generation } => {
                self.on_kick(id, generation).await;
            }

            TableMessage::Close { respond } => {
                self.closed = true;
                let _ = respond.send(());
            }
        }
    }

    async fn on_base_timer(&mut self, token: u64) {
        if !self.clock.matches(token) || token != self.table.turn_token() {
            return;
        }
        match self.table.open_time_bank() {
            Some(remaining_ms) => {
                let handle =
                    self.schedule(remaining_ms, TableMessage::BankTimerElapsed { token });
                self.clock.arm_bank(token, handle);
                if let Some(seat) = self.table.current_actor() {
                    if let Some(p) = self.table.player(seat) {
                        let id = p.id.clone();
                        self.broadcast(TableOutbound::TimeBankStart {
                            seat,
                            id,
                            remaining_ms,
                        });
                    }
                }
            }
            None => {
                self.clock.cancel();
                self.table.timeout_current_actor();
                self.after_mutation().await;
            }
        }
    }

    async fn on_bank_timer(&mut self, token: u64) {
        if !self.clock.matches(token) || token != self.table.turn_token() {
            return;
        }
        if let Some(elapsed) = self.clock.bank_elapsed_ms() {
            self.table.burn_time_bank(elapsed);
        }
        self.clock.cancel();
        self.table.timeout_current_actor();
        self.after_mutation().await;
    }

    async fn on_kick(&mut self, id: PlayerId, generation: u64) {
        let current = self.kick_timers.get(&id).map(|(g, _)| *g);
        if current != Some(generation) {
            return;
        }
        self.kick_timers.remove(&id);
        let still_out = self
            .table
            .seat_of(&id)
            .and_then(|s| self.table.player(s))
            .is_some_and(|p| p.sitting_out || p.sit_out_next_hand);
        if still_out {
            log::info!("table {}: kicking idle player {}", self.id, id.short());
            if let Err(e) = self.table.remove_player(&id) {
                log::debug!("table {}: kick skipped: {e}", self.id);
            }
            self.after_mutation().await;
        }
    }

    /// Drain the table's event queue, persist and forward as needed,
    /// then bring the action clock in line with the new turn state.
    async fn after_mutation(&mut self) {
        let events = self.table.drain_events();
        for event in events {
            match event {
                TableEvent::StateChanged => {
                    let snapshot = self.table.snapshot();
                    self.broadcast(TableOutbound::Snapshot(snapshot));
                }
                TableEvent::LogLines(lines) => {
                    self.broadcast(TableOutbound::LogLines(lines));
                }
                TableEvent::HandStartPending { delay_ms } => {
                    if let Some(old) = self.hand_start_timer.take() {
                        old.abort();
                    }
                    let handle = self.schedule(delay_ms, TableMessage::HandStartElapsed);
                    self.hand_start_timer = Some(handle);
                }
                TableEvent::RunOutPending { delay_ms } => {
                    if let Some(old) = self.runout_timer.take() {
                        old.abort();
                    }
                    let hand_no = self.table.hand_no();
                    let handle =
                        self.schedule(delay_ms, TableMessage::RunOutElapsed { hand_no });
                    self.runout_timer = Some(handle);
                }
                TableEvent::HandComplete {
                    record,
                    personal_logs,
                } => {
                    self.persist_hand(&record).await;
                    self.broadcast(TableOutbound::HandComplete {
                        record,
                        personal_logs,
                    });
                }
                TableEvent::PlayerLeft {
                    seat,
                    id,
                    handle: _,
                    chips,
                } => {
                    if let Err(e) = self
                        .stores
                        .players
                        .record_leave(&id, chips as i64)
                        .await
                    {
                        log::error!("table {}: leave persist failed: {e}", self.id);
                    }
                    self.broadcast(TableOutbound::PlayerLeft { seat, id, chips });
                }
                TableEvent::ProfileUpdated { id, chips } => {
                    if let Err(e) = self.stores.players.set_chips(&id, chips as i64).await {
                        log::error!("table {}: chip persist failed: {e}", self.id);
                    }
                    self.broadcast(TableOutbound::ProfileUpdated { id, chips });
                }
                TableEvent::SitOutStarted { id } => {
                    self.arm_kick(id);
                }
                TableEvent::SitOutCleared { id } => {
                    if let Some((_, handle)) = self.kick_timers.remove(&id) {
                        handle.abort();
                    }
                }
            }
        }
        self.sync_action_clock().await;
    }

    /// Arm (or replace) the base action timer whenever the turn token
    /// has moved on from what the clock was armed with.
    async fn sync_action_clock(&mut self) {
        let token = self.table.turn_token();
        let actor = self.table.current_actor().and_then(|seat| {
            self.table
                .player(seat)
                .filter(|p| p.can_act())
                .map(|p| (seat, p.id.clone()))
        });
        match actor {
            Some((seat, id)) => {
                if self.clock.armed_token() != Some(token) {
                    let duration_ms = self.table.config().base_action_ms;
                    let handle =
                        self.schedule(duration_ms, TableMessage::BaseTimerElapsed { token });
                    self.clock.arm_base(token, handle);
                    self.broadcast(TableOutbound::ActionTimerStart {
                        seat,
                        id,
                        duration_ms,
                    });
                }
            }
            None => self.clock.cancel(),
        }
    }

    fn arm_kick(&mut self, id: PlayerId) {
        self.kick_generation += 1;
        let generation = self.kick_generation;
        let delay_ms = self.table.config().sit_out_kick_ms;
        let handle = self.schedule(
            delay_ms,
            TableMessage::KickElapsed {
                id: id.clone(),
                generation,
            },
        );
        if let Some((_, old)) = self.kick_timers.insert(id, (generation, handle)) {
            old.abort();
        }
    }

    /// Archive a completed hand. Failures are logged and swallowed: the
    /// live game must continue even when archiving is down.
    async fn persist_hand(&self, record: &crate::game::HandRecord) {
        if let Err(e) = self.stores.hands.save_hand(self.id, record).await {
            log::error!(
                "table {}: failed to archive hand {}: {e}",
                self.id,
                record.hand_no
            );
        }
        for row in &record.players {
            if let Err(e) = self
                .stores
                .players
                .apply_hand_result(
                    &row.id,
                    row.ending_stack as i64,
                    row.won_amount as i64,
                    row.total_committed as i64,
                )
                .await
            {
                log::error!(
                    "table {}: failed to persist result for {}: {e}",
                    self.id,
                    row.id.short()
                );
            }
        }
    }

    /// Non-blocking: the actor must never wait on the coordinator,
    /// which may itself be waiting on this actor's inbox.
    fn broadcast(&self, outbound: TableOutbound) {
        match self.outbound.try_send((self.id, outbound)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("table {}: outbound backlog full, dropping event", self.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::warn!("table {}: outbound channel closed", self.id);
            }
        }
    }

    fn schedule(&self, delay_ms: Millis, message: TableMessage) -> JoinHandle<()> {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = tx.send(message).await;
        })
    }

    /// Cancel every pending callback before releasing the table.
    fn teardown(&mut self) {
        self.clock.cancel();
        if let Some(handle) = self.hand_start_timer.take() {
            handle.abort();
        }
        if let Some(handle) = self.runout_timer.take() {
            handle.abort();
        }
        for (_, (_, handle)) in self.kick_timers.drain() {
            handle.abort();
        }
    }
}
