//! Table actor message types.

use crate::{
    db::TableId,
    game::{
        entities::{Action, Chips, Millis},
        history::LogLine,
        table::{ActionError, HandRecord, TableSnapshot},
        PlayerId,
    },
};
use tokio::sync::oneshot;

/// Commands and scheduled callbacks delivered to a table actor through
/// its single ordered inbox. Timer variants carry the turn token (or
/// generation) they were armed with so stale deliveries no-op.
#[derive(Debug)]
pub enum TableMessage {
    /// Seat a player (or report their existing seat).
    Join {
        id: PlayerId,
        handle: String,
        preferred_seat: Option<usize>,
        buy_in: Chips,
        respond: oneshot::Sender<Result<usize, ActionError>>,
    },

    /// Leave the table, cashing the stack out to the player record.
    Leave {
        id: PlayerId,
        respond: oneshot::Sender<Result<(), ActionError>>,
    },

    /// A betting action from the player to move.
    TakeAction {
        id: PlayerId,
        action: Action,
        respond: oneshot::Sender<Result<(), ActionError>>,
    },

    SitOut {
        id: PlayerId,
        respond: oneshot::Sender<Result<(), ActionError>>,
    },

    SitBackIn {
        id: PlayerId,
        respond: oneshot::Sender<Result<(), ActionError>>,
    },

    Rebuy {
        id: PlayerId,
        buy_in: Chips,
        respond: oneshot::Sender<Result<Chips, ActionError>>,
    },

    /// Transport-level connectivity changed for a seated identity.
    SetDisconnected { id: PlayerId, disconnected: bool },

    /// Escalation after the disconnect grace elapsed: sit the player
    /// out, folding their live hand if any.
    ForceSitOut { id: PlayerId },

    /// Current unredacted state, for the coordinator.
    GetSnapshot {
        respond: oneshot::Sender<TableSnapshot>,
    },

    /// Scheduled: the debounced hand start elapsed.
    HandStartElapsed,

    /// Scheduled: base action timer expired.
    BaseTimerElapsed { token: u64 },

    /// Scheduled: time-bank timer expired.
    BankTimerElapsed { token: u64 },

    /// Scheduled: next dramatic run-out step.
    RunOutElapsed { hand_no: u64 },

    /// Scheduled: sit-out kick expired for a player.
    KickElapsed { id: PlayerId, generation: u64 },

    /// Shut the table down, cancelling all pending callbacks.
    Close {
        respond: oneshot::Sender<()>,
    },
}

/// Everything a table pushes outward, tagged with its table id by the
/// actor's outbound channel. The coordinator is the sole consumer.
#[derive(Clone, Debug)]
pub enum TableOutbound {
    /// Fresh full snapshot; the coordinator personalises and fans out.
    Snapshot(TableSnapshot),

    /// Base action countdown started for the seat to act.
    ActionTimerStart {
        seat: usize,
        id: PlayerId,
        duration_ms: Millis,
    },

    /// Time-bank countdown started for the seat to act.
    TimeBankStart {
        seat: usize,
        id: PlayerId,
        remaining_ms: Millis,
    },

    /// Hand-history lines in emission order.
    LogLines(Vec<LogLine>),

    /// A hand finished; personalised transcripts keyed by identity.
    HandComplete {
        record: HandRecord,
        personal_logs: Vec<(PlayerId, String)>,
    },

    /// A seat was vacated.
    PlayerLeft {
        seat: usize,
        id: PlayerId,
        chips: Chips,
    },

    /// Persisted chip total changed.
    ProfileUpdated { id: PlayerId, chips: Chips },
}

/// Outbound envelope: which table said it.
pub type TableBroadcast = (TableId, TableOutbound);
