//! Authentication data models.

use serde::{Deserialize, Serialize};

/// Event kind discriminator for authentication envelopes.
pub const AUTH_EVENT_KIND: u32 = 22242;

/// A freshly issued challenge, returned to the client.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Challenge {
    pub challenge_id: String,
    pub nonce: String,
}

/// The public-key-signed envelope a client returns for a challenge.
/// The engine checks structure (kind, timestamp, nonce tag); the
/// signature itself is the verifier's business.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SignedEvent {
    /// Hex x-only public key; doubles as the opaque identity.
    pub pubkey: String,
    /// Unix seconds.
    pub created_at: i64,
    pub kind: u32,
    /// Tag list; the challenge nonce rides as `["challenge", nonce]`.
    pub tags: Vec<Vec<String>>,
    /// Free-form content; may carry optional profile fields as JSON.
    pub content: String,
    /// Hex sha256 of the canonical serialization.
    pub id: String,
    /// Hex 64-byte signature over the id.
    pub sig: String,
}

impl SignedEvent {
    /// The canonical byte serialization the event id commits to:
    /// `[0, pubkey, created_at, kind, tags, content]` as compact JSON.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let value = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content,
        ]);
        serde_json::to_vec(&value).unwrap_or_default()
    }

    pub fn challenge_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.len() >= 2 && t[0] == "challenge")
            .map(|t| t[1].as_str())
    }
}

/// Optional profile fields carried in the event content.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProfileContent {
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
    pub lightning_address: Option<String>,
}

/// What a successful verification yields.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionGrant {
    pub session_token: String,
    pub identity: String,
    pub profile: crate::db::repository::PlayerRecord,
}
