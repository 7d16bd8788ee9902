//! Session coordination: connection↔identity↔seat mapping, disconnect
//! grace, observers, and personalised state fan-out.

pub mod coordinator;
pub mod messages;
pub mod rate_limiter;
pub mod views;

pub use coordinator::{ConnId, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMessage};
pub use messages::{ClientCommand, ErrorKind, ServerEvent};
pub use rate_limiter::RateLimiter;
pub use views::{personalise, SeatView, TableView};
