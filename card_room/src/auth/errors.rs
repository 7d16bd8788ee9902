//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Persistence error
    #[error("store error: {0}")]
    Store(#[from] crate::db::StoreError),

    /// Challenge missing, already used, or expired
    #[error("challenge invalid or expired")]
    ChallengeInvalid,

    /// Signed event timestamp outside the acceptance window
    #[error("timestamp out of range")]
    TimestampOutOfRange,

    /// The event does not commit to the challenge nonce
    #[error("challenge nonce mismatch")]
    NonceMismatch,

    /// Wrong event kind discriminator
    #[error("unexpected event kind")]
    WrongEventKind,

    /// Signature or event id does not verify
    #[error("signature verification failed")]
    BadSignature,

    /// Session token missing, expired, or unknown
    #[error("session invalid or expired")]
    SessionInvalid,
}

impl AuthError {
    /// Client-safe message; storage details never leave the process.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Store(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
