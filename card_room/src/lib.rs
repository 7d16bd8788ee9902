//! # Card Room
//!
//! A server-authoritative, real-time No-Limit Texas Hold'em engine for
//! 6-seat tables. Clients are untrusted: the server alone owns the deck,
//! the random source, hand evaluation, chip accounting, the action
//! timers, and the betting state machine. Clients submit actions and
//! receive personalised state snapshots and event notifications.
//!
//! ## Architecture
//!
//! - [`game`]: the pure core — cards, hand evaluation, pot math, hand
//!   history, and the table state machine with its outbound event
//!   stream.
//! - [`table`]: the per-table actor. One tokio task owns one table; all
//!   inputs (transport commands, timer expiries, scheduled steps)
//!   arrive through a single ordered inbox, so no two operations on a
//!   table ever race.
//! - [`session`]: the coordinator. Maps connections to identities to
//!   seats, handles reconnection grace and disconnect escalation, and
//!   fans out personalised views.
//! - [`auth`]: challenge/response authentication against an external
//!   signature scheme, plus session tokens.
//! - [`db`]: persistence adapters (hand archive, player records, bans)
//!   over Postgres, behind repository traits with in-memory test
//!   doubles.

pub mod auth;
pub mod db;
pub mod game;
pub mod session;
pub mod table;

pub use game::{
    Action, ActionError, Card, Chips, HandRecord, Phase, PlayerId, TableEvent,
};
pub use table::{TableConfig, TableHandle};
