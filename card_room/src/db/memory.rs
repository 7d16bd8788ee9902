//! In-memory store for tests and local development.
//!
//! Implements every repository trait over a single mutex-guarded map
//! set, mirroring the semantics of the Pg implementations closely
//! enough for engine and coordinator tests.

use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::Mutex,
};

use super::{
    errors::StoreResult,
    repository::{
        AbuseStore, ChallengeRow, ChallengeStore, HandStore, PlayerRecord, PlayerStore,
        StoredHand, StoredHandPlayer,
    },
    TableId,
};
use crate::game::{table::HandRecord, PlayerId};

#[derive(Default)]
struct Inner {
    hands: Vec<(StoredHand, Vec<StoredHandPlayer>)>,
    players: HashMap<String, PlayerRecord>,
    sessions: HashMap<String, (String, i64)>,
    ip_bans: HashMap<String, String>,
    challenges: HashMap<String, ChallengeRow>,
    abuse: Vec<(Option<String>, String, String)>,
    next_hand_id: i64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_hand_id: 1,
                ..Inner::default()
            }),
        }
    }

    /// Test hook: number of abuse entries recorded.
    pub fn abuse_len(&self) -> usize {
        self.inner.lock().unwrap().abuse.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn join_cards(cards: &[crate::game::Card]) -> String {
    cards
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn blank_record(identity: &str) -> PlayerRecord {
    PlayerRecord {
        identity: identity.to_string(),
        handle: String::new(),
        avatar_url: None,
        lightning_address: None,
        current_chips: 0,
        hands_played: 0,
        hands_won: 0,
        total_winnings: 0,
        total_losses: 0,
        is_banned: false,
        ban_reason: None,
    }
}

#[async_trait]
impl HandStore for MemoryStore {
    async fn save_hand(&self, table_id: TableId, record: &HandRecord) -> StoreResult<i64> {
        let mut inner = self.inner.lock().unwrap();
        let hand_id = inner.next_hand_id;
        inner.next_hand_id += 1;
        let stored = StoredHand {
            hand_id,
            table_id,
            started_at: record.started_at.timestamp(),
            completed_at: record.completed_at.timestamp(),
            sb: record.small_blind as i64,
            bb: record.big_blind as i64,
            button_seat: record.button_seat as i32,
            pot_total: record.pot_total as i64,
            community_cards: join_cards(&record.community),
            hand_history: record.history.clone(),
        };
        let players = record
            .players
            .iter()
            .map(|p| StoredHandPlayer {
                hand_id,
                identity: p.id.as_str().to_string(),
                handle: p.handle.clone(),
                seat_index: p.seat as i32,
                starting_stack: p.starting_stack as i64,
                ending_stack: p.ending_stack as i64,
                total_committed: p.total_committed as i64,
                hole_cards: join_cards(&p.hole_cards),
                final_hand: p.final_hand.clone(),
                position: p.position.clone(),
                actions: p.actions.join("; "),
                won_amount: p.won_amount as i64,
            })
            .collect();
        inner.hands.push((stored, players));
        Ok(hand_id)
    }

    async fn hand_by_id(
        &self,
        hand_id: i64,
    ) -> StoreResult<Option<(StoredHand, Vec<StoredHandPlayer>)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hands
            .iter()
            .find(|(h, _)| h.hand_id == hand_id)
            .cloned())
    }

    async fn hands_by_identity(
        &self,
        identity: &PlayerId,
        limit: i64,
    ) -> StoreResult<Vec<StoredHand>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hands
            .iter()
            .filter(|(_, ps)| ps.iter().any(|p| p.identity == identity.as_str()))
            .rev()
            .take(limit as usize)
            .map(|(h, _)| h.clone())
            .collect())
    }

    async fn hand_count(&self) -> StoreResult<i64> {
        Ok(self.inner.lock().unwrap().hands.len() as i64)
    }
}

#[async_trait]
impl PlayerStore for MemoryStore {
    async fn upsert_profile(&self, identity: &PlayerId, handle: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .players
            .entry(identity.as_str().to_string())
            .or_insert_with(|| blank_record(identity.as_str()));
        record.handle = handle.to_string();
        Ok(())
    }

    async fn player(&self, identity: &PlayerId) -> StoreResult<Option<PlayerRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.players.get(identity.as_str()).cloned())
    }

    async fn set_chips(&self, identity: &PlayerId, chips: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.players.get_mut(identity.as_str()) {
            r.current_chips = chips;
        }
        Ok(())
    }

    async fn apply_hand_result(
        &self,
        identity: &PlayerId,
        chips: i64,
        won_amount: i64,
        committed: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.players.get_mut(identity.as_str()) {
            r.current_chips = chips;
            r.hands_played += 1;
            if won_amount > 0 {
                r.hands_won += 1;
            }
            r.total_winnings += won_amount;
            r.total_losses += committed;
        }
        Ok(())
    }

    async fn record_leave(&self, identity: &PlayerId, chips: i64) -> StoreResult<()> {
        self.set_chips(identity, chips).await
    }

    async fn ban(&self, identity: &PlayerId, reason: &str, banned_by: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .players
            .entry(identity.as_str().to_string())
            .or_insert_with(|| blank_record(identity.as_str()));
        record.is_banned = true;
        record.ban_reason = Some(format!("{reason} (by {banned_by})"));
        Ok(())
    }

    async fn unban(&self, identity: &PlayerId) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.players.get_mut(identity.as_str()) {
            r.is_banned = false;
            r.ban_reason = None;
        }
        Ok(())
    }

    async fn ban_reason(&self, identity: &PlayerId) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .players
            .get(identity.as_str())
            .filter(|r| r.is_banned)
            .map(|r| r.ban_reason.clone().unwrap_or_else(|| "banned".to_string())))
    }

    async fn ban_ip(&self, ip: &str, reason: &str, _banned_by: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ip_bans.insert(ip.to_string(), reason.to_string());
        Ok(())
    }

    async fn unban_ip(&self, ip: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.ip_bans.remove(ip);
        Ok(())
    }

    async fn is_ip_banned(&self, ip: &str) -> StoreResult<bool> {
        Ok(self.inner.lock().unwrap().ip_bans.contains_key(ip))
    }

    async fn set_session(
        &self,
        identity: &PlayerId,
        token: &str,
        expires_at: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sessions
            .insert(token.to_string(), (identity.as_str().to_string(), expires_at));
        Ok(())
    }

    async fn player_by_session(
        &self,
        token: &str,
        now: i64,
    ) -> StoreResult<Option<PlayerRecord>> {
        let inner = self.inner.lock().unwrap();
        let Some((identity, expires)) = inner.sessions.get(token) else {
            return Ok(None);
        };
        if *expires <= now {
            return Ok(None);
        }
        Ok(inner.players.get(identity).cloned())
    }

    async fn clear_expired_sessions(&self, now: i64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.sessions.len();
        inner.sessions.retain(|_, (_, exp)| *exp > now);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn player_count(&self) -> StoreResult<i64> {
        Ok(self.inner.lock().unwrap().players.len() as i64)
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn create_challenge(&self, row: &ChallengeRow) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .challenges
            .insert(row.challenge_id.clone(), row.clone());
        Ok(())
    }

    async fn consume_challenge(
        &self,
        challenge_id: &str,
        now: i64,
    ) -> StoreResult<Option<ChallengeRow>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner.challenges.get_mut(challenge_id) else {
            return Ok(None);
        };
        if row.used || row.expires_at <= now {
            return Ok(None);
        }
        row.used = true;
        Ok(Some(row.clone()))
    }

    async fn purge_expired_challenges(&self, now: i64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.challenges.len();
        inner.challenges.retain(|_, c| c.expires_at > now);
        Ok((before - inner.challenges.len()) as u64)
    }
}

#[async_trait]
impl AbuseStore for MemoryStore {
    async fn record_abuse(
        &self,
        identity: Option<&PlayerId>,
        ip: &str,
        action: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.abuse.push((
            identity.map(|i| i.as_str().to_string()),
            ip.to_string(),
            action.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PlayerId {
        PlayerId::new(s)
    }

    #[tokio::test]
    async fn test_upsert_and_fetch_player() {
        let store = MemoryStore::new();
        store.upsert_profile(&pid("abc"), "alice").await.unwrap();
        let record = store.player(&pid("abc")).await.unwrap().unwrap();
        assert_eq!(record.handle, "alice");
        assert!(!record.is_banned);
    }

    #[tokio::test]
    async fn test_ban_unban_round_trip() {
        let store = MemoryStore::new();
        store.ban(&pid("abc"), "collusion", "admin").await.unwrap();
        assert!(store.ban_reason(&pid("abc")).await.unwrap().is_some());
        store.unban(&pid("abc")).await.unwrap();
        assert!(store.ban_reason(&pid("abc")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let store = MemoryStore::new();
        store.upsert_profile(&pid("abc"), "alice").await.unwrap();
        store.set_session(&pid("abc"), "tok", 1_000).await.unwrap();
        assert!(store.player_by_session("tok", 500).await.unwrap().is_some());
        assert!(store.player_by_session("tok", 1_000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_challenge_single_use() {
        let store = MemoryStore::new();
        store
            .create_challenge(&ChallengeRow {
                challenge_id: "c1".to_string(),
                nonce: "abcd".to_string(),
                expires_at: 10_000,
                used: false,
            })
            .await
            .unwrap();
        assert!(store.consume_challenge("c1", 100).await.unwrap().is_some());
        // Second consumption is a replay and must fail.
        assert!(store.consume_challenge("c1", 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_challenge_expiry_rejected() {
        let store = MemoryStore::new();
        store
            .create_challenge(&ChallengeRow {
                challenge_id: "c2".to_string(),
                nonce: "abcd".to_string(),
                expires_at: 100,
                used: false,
            })
            .await
            .unwrap();
        assert!(store.consume_challenge("c2", 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_hand_result_updates_counters() {
        let store = MemoryStore::new();
        store.upsert_profile(&pid("abc"), "alice").await.unwrap();
        store
            .apply_hand_result(&pid("abc"), 10_150, 150, 100)
            .await
            .unwrap();
        let record = store.player(&pid("abc")).await.unwrap().unwrap();
        assert_eq!(record.current_chips, 10_150);
        assert_eq!(record.hands_played, 1);
        assert_eq!(record.hands_won, 1);
        assert_eq!(record.total_winnings, 150);
        assert_eq!(record.total_losses, 100);
    }
}
