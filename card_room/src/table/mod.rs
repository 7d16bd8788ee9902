//! Per-table actor: message-passing ownership of a single table.
//!
//! One actor task owns one [`crate::game::Table`]. Commands and every
//! scheduled callback (hand start, action timers, run-out steps, kick
//! timers) are delivered through the same ordered inbox.

pub mod actor;
pub mod clock;
pub mod messages;

pub use actor::{TableActor, TableHandle};
pub use clock::ActionClock;
pub use messages::{TableBroadcast, TableMessage, TableOutbound};

pub use crate::db::TableId;
pub use crate::game::table::TableConfig;
