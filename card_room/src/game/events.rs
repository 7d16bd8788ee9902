//! Outbound table events.
//!
//! The state machine never holds callbacks into the transport layer;
//! every notification it produces is a variant on one tagged stream that
//! the table actor drains after each mutation and the coordinator fans
//! out. Scheduling variants are hints: the actor owns the clocks.

use super::{
    entities::{Chips, Millis, PlayerId},
    history::LogLine,
    table::HandRecord,
};

#[derive(Clone, Debug)]
pub enum TableEvent {
    /// State changed; a fresh snapshot should be broadcast.
    StateChanged,
    /// A hand should be scheduled to start after the debounce delay.
    HandStartPending { delay_ms: Millis },
    /// The next dramatic run-out step should fire after `delay_ms`.
    RunOutPending { delay_ms: Millis },
    /// New hand-history lines since the last drain.
    LogLines(Vec<LogLine>),
    /// A hand finished: archive row plus per-participant transcripts.
    HandComplete {
        record: HandRecord,
        personal_logs: Vec<(PlayerId, String)>,
    },
    /// A seat was vacated; the chips travel back to the player record.
    PlayerLeft {
        seat: usize,
        id: PlayerId,
        handle: String,
        chips: Chips,
    },
    /// Persisted chip total changed outside a hand (rebuy, leave).
    ProfileUpdated { id: PlayerId, chips: Chips },
    /// A player began sitting out; the kick timer should be (re)armed.
    SitOutStarted { id: PlayerId },
    /// A player is active again; the kick timer should be cancelled.
    SitOutCleared { id: PlayerId },
}
