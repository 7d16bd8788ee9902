//! Challenge/response authentication manager.
//!
//! Issues one-use challenges, validates signed envelopes against them,
//! and mints opaque session tokens bound to the signer's identity.
//! Replay is prevented structurally: challenge consumption is a single
//! atomic store operation.

use super::{
    errors::{AuthError, AuthResult},
    models::{Challenge, ProfileContent, SessionGrant, SignedEvent, AUTH_EVENT_KIND},
    verifier::SignatureVerifier,
};
use crate::{
    db::{
        repository::{ChallengeRow, PlayerRecord},
        ChallengeStore, PlayerStore, Stores,
    },
    game::PlayerId,
};
use chrono::Utc;
use rand::RngCore;
use std::sync::Arc;
use uuid::Uuid;

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    stores: Stores,
    verifier: Arc<dyn SignatureVerifier>,
    challenge_ttl_s: i64,
    session_ttl_s: i64,
    timestamp_skew_s: i64,
}

impl AuthManager {
    pub fn new(stores: Stores, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            stores,
            verifier,
            challenge_ttl_s: 300,
            session_ttl_s: 86_400,
            timestamp_skew_s: 300,
        }
    }

    pub fn with_ttls(mut self, challenge_ttl_s: i64, session_ttl_s: i64) -> Self {
        self.challenge_ttl_s = challenge_ttl_s;
        self.session_ttl_s = session_ttl_s;
        self
    }

    /// Issue a fresh one-use challenge: 32 random bytes of nonce, hex.
    pub async fn create_challenge(&self) -> AuthResult<Challenge> {
        let mut nonce_bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let challenge = Challenge {
            challenge_id: Uuid::new_v4().to_string(),
            nonce: hex::encode(nonce_bytes),
        };
        self.stores
            .challenges
            .create_challenge(&ChallengeRow {
                challenge_id: challenge.challenge_id.clone(),
                nonce: challenge.nonce.clone(),
                expires_at: Utc::now().timestamp() + self.challenge_ttl_s,
                used: false,
            })
            .await?;
        Ok(challenge)
    }

    /// Verify a signed envelope against a live challenge and mint a
    /// session. The challenge is consumed first, so a failed signature
    /// still burns it.
    pub async fn verify(
        &self,
        challenge_id: &str,
        event: &SignedEvent,
    ) -> AuthResult<SessionGrant> {
        let now = Utc::now().timestamp();
        let row = self
            .stores
            .challenges
            .consume_challenge(challenge_id, now)
            .await?
            .ok_or(AuthError::ChallengeInvalid)?;

        if event.kind != AUTH_EVENT_KIND {
            return Err(AuthError::WrongEventKind);
        }
        if (event.created_at - now).abs() > self.timestamp_skew_s {
            return Err(AuthError::TimestampOutOfRange);
        }
        if event.challenge_tag() != Some(row.nonce.as_str()) {
            return Err(AuthError::NonceMismatch);
        }
        if !self.verifier.verify(event) {
            return Err(AuthError::BadSignature);
        }

        let identity = PlayerId::new(event.pubkey.clone());
        let profile_fields: ProfileContent =
            serde_json::from_str(&event.content).unwrap_or_default();
        let handle = profile_fields
            .handle
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| identity.short().to_string());
        self.stores.players.upsert_profile(&identity, &handle).await?;

        let session_token = Uuid::new_v4().to_string();
        self.stores
            .players
            .set_session(&identity, &session_token, now + self.session_ttl_s)
            .await?;

        let profile = self
            .stores
            .players
            .player(&identity)
            .await?
            .ok_or(AuthError::SessionInvalid)?;
        Ok(SessionGrant {
            session_token,
            identity: identity.as_str().to_string(),
            profile,
        })
    }

    /// Resolve a session token to its player record.
    pub async fn session(&self, token: &str) -> AuthResult<PlayerRecord> {
        let now = Utc::now().timestamp();
        self.stores
            .players
            .player_by_session(token, now)
            .await?
            .ok_or(AuthError::SessionInvalid)
    }

    /// Hourly sweeper: drop expired challenges and sessions. Returns
    /// (challenges purged, sessions cleared).
    pub async fn cleanup_expired(&self) -> AuthResult<(u64, u64)> {
        let now = Utc::now().timestamp();
        let challenges = self.stores.challenges.purge_expired_challenges(now).await?;
        let sessions = self.stores.players.clear_expired_sessions(now).await?;
        Ok((challenges, sessions))
    }
}
