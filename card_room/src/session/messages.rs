//! Client/server wire messages for the game channel.
//!
//! JSON tagged enums over a persistent duplex transport. The
//! coordinator is the only producer of [`ServerEvent`]s and the only
//! consumer of [`ClientCommand`]s.

use super::views::TableView;
use crate::{
    db::TableId,
    game::{entities::Millis, Action, ActionError, Chips},
};
use serde::{Deserialize, Serialize};

/// Commands a client may send.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Take (or retake) a seat. Reconnection is the same command: an
    /// identity that already holds a seat gets its transport swapped.
    JoinTable {
        table_id: TableId,
        #[serde(default)]
        seat: Option<usize>,
        #[serde(default)]
        buy_in: Option<Chips>,
    },
    /// Watch without authenticating.
    ObserveTable { table_id: TableId },
    /// A betting action.
    Action { action: Action },
    SitOut,
    SitBackIn,
    Rebuy { buy_in: Chips },
    LeaveTable,
    ChatMessage { text: String },
}

/// Error kinds a client can receive. One event per offending input,
/// delivered to that transport only.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Unauthorized,
    RateLimited,
    InvalidArgument,
    IllegalAction,
    TableFull,
    TableNotFound,
    NotInHand,
    AlreadySeated,
    Internal,
}

impl From<&ActionError> for ErrorKind {
    fn from(err: &ActionError) -> Self {
        match err {
            ActionError::OutOfTurn
            | ActionError::NotInHand
            | ActionError::CannotCheck
            | ActionError::RaiseNotAllowed
            | ActionError::HandInProgress => ErrorKind::IllegalAction,
            ActionError::RaiseTooSmall { .. } | ActionError::InvalidBuyIn { .. } => {
                ErrorKind::InvalidArgument
            }
            ActionError::TableFull => ErrorKind::TableFull,
            ActionError::AlreadySeated { .. } => ErrorKind::AlreadySeated,
            ActionError::NotSeated => ErrorKind::NotInHand,
            ActionError::TableClosed => ErrorKind::TableNotFound,
        }
    }
}

/// Events the server pushes to clients.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    SeatAssigned {
        table_id: TableId,
        seat: usize,
    },
    GameState {
        view: TableView,
    },
    ActionTimerStart {
        seat: usize,
        duration_ms: Millis,
    },
    TimeBankStart {
        seat: usize,
        remaining_ms: Millis,
    },
    HandLog {
        lines: Vec<String>,
    },
    HandComplete {
        hand_no: u64,
        history: String,
    },
    ProfileUpdated {
        chips: Chips,
    },
    Chat {
        from: String,
        observer: bool,
        text: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    AuthError {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_json_shape() {
        let json = r#"{"type":"join_table","table_id":1,"seat":2,"buy_in":5000}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinTable {
                table_id: 1,
                seat: Some(2),
                buy_in: Some(5000)
            }
        );
    }

    #[test]
    fn test_action_command_nested_tagging() {
        let json = r#"{"type":"action","action":{"type":"raise","total":300}}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Action {
                action: Action::Raise { total: 300 }
            }
        );
    }

    #[test]
    fn test_join_table_defaults_optional_fields() {
        let json = r#"{"type":"join_table","table_id":9}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::JoinTable {
                table_id: 9,
                seat: None,
                buy_in: None
            }
        );
    }

    #[test]
    fn test_server_event_serializes_tagged() {
        let event = ServerEvent::SeatAssigned {
            table_id: 1,
            seat: 4,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"seat_assigned","table_id":1,"seat":4}"#);
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            ErrorKind::from(&ActionError::CannotCheck),
            ErrorKind::IllegalAction
        );
        assert_eq!(
            ErrorKind::from(&ActionError::RaiseTooSmall { total: 1, min: 2 }),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ErrorKind::from(&ActionError::AlreadySeated { seat: 0 }),
            ErrorKind::AlreadySeated
        );
    }
}
