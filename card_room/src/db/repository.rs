//! Repository traits and their PostgreSQL implementations.
//!
//! Trait-based so the engine and the coordinator can be tested against
//! in-memory doubles; production code only ever sees the traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use super::{errors::StoreResult, TableId};
use crate::game::{table::HandRecord, PlayerId};

/// A stored player record, the durable side of an identity.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PlayerRecord {
    pub identity: String,
    pub handle: String,
    pub avatar_url: Option<String>,
    pub lightning_address: Option<String>,
    pub current_chips: i64,
    pub hands_played: i64,
    pub hands_won: i64,
    pub total_winnings: i64,
    pub total_losses: i64,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
}

/// A stored hand header (list form; rows loaded separately).
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoredHand {
    pub hand_id: i64,
    pub table_id: TableId,
    pub started_at: i64,
    pub completed_at: i64,
    pub sb: i64,
    pub bb: i64,
    pub button_seat: i32,
    pub pot_total: i64,
    pub community_cards: String,
    pub hand_history: String,
}

/// A stored per-participant row.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoredHandPlayer {
    pub hand_id: i64,
    pub identity: String,
    pub handle: String,
    pub seat_index: i32,
    pub starting_stack: i64,
    pub ending_stack: i64,
    pub total_committed: i64,
    pub hole_cards: String,
    pub final_hand: Option<String>,
    pub position: String,
    pub actions: String,
    pub won_amount: i64,
}

/// One-use authentication challenge.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChallengeRow {
    pub challenge_id: String,
    pub nonce: String,
    pub expires_at: i64,
    pub used: bool,
}

/// Hand archive operations.
#[async_trait]
pub trait HandStore: Send + Sync {
    /// Persist a completed hand with its per-participant rows. Returns
    /// the archive id.
    async fn save_hand(&self, table_id: TableId, record: &HandRecord) -> StoreResult<i64>;

    async fn hand_by_id(
        &self,
        hand_id: i64,
    ) -> StoreResult<Option<(StoredHand, Vec<StoredHandPlayer>)>>;

    async fn hands_by_identity(
        &self,
        identity: &PlayerId,
        limit: i64,
    ) -> StoreResult<Vec<StoredHand>>;

    async fn hand_count(&self) -> StoreResult<i64>;
}

/// Player records, bans, and session tokens. Cross-identity state is
/// shared between tables; all mutations are single statements, atomic
/// at the database.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Create or refresh a player row on authentication.
    async fn upsert_profile(&self, identity: &PlayerId, handle: &str) -> StoreResult<()>;

    async fn player(&self, identity: &PlayerId) -> StoreResult<Option<PlayerRecord>>;

    async fn set_chips(&self, identity: &PlayerId, chips: i64) -> StoreResult<()>;

    /// Per-hand counters: chips, hands played/won, running totals.
    async fn apply_hand_result(
        &self,
        identity: &PlayerId,
        chips: i64,
        won_amount: i64,
        committed: i64,
    ) -> StoreResult<()>;

    async fn record_leave(&self, identity: &PlayerId, chips: i64) -> StoreResult<()>;

    async fn ban(&self, identity: &PlayerId, reason: &str, banned_by: &str) -> StoreResult<()>;
    async fn unban(&self, identity: &PlayerId) -> StoreResult<()>;
    async fn ban_reason(&self, identity: &PlayerId) -> StoreResult<Option<String>>;

    async fn ban_ip(&self, ip: &str, reason: &str, banned_by: &str) -> StoreResult<()>;
    async fn unban_ip(&self, ip: &str) -> StoreResult<()>;
    async fn is_ip_banned(&self, ip: &str) -> StoreResult<bool>;

    async fn set_session(
        &self,
        identity: &PlayerId,
        token: &str,
        expires_at: i64,
    ) -> StoreResult<()>;

    /// Resolve a session token to its player, honouring expiry.
    async fn player_by_session(&self, token: &str, now: i64)
        -> StoreResult<Option<PlayerRecord>>;

    async fn clear_expired_sessions(&self, now: i64) -> StoreResult<u64>;

    async fn player_count(&self) -> StoreResult<i64>;
}

/// Challenge lifecycle. `consume` is the single atomic gate against
/// replay: it flips `used` and returns the row only when it was live.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn create_challenge(&self, row: &ChallengeRow) -> StoreResult<()>;
    async fn consume_challenge(
        &self,
        challenge_id: &str,
        now: i64,
    ) -> StoreResult<Option<ChallengeRow>>;
    async fn purge_expired_challenges(&self, now: i64) -> StoreResult<u64>;
}

/// Abuse log appends.
#[async_trait]
pub trait AbuseStore: Send + Sync {
    async fn record_abuse(
        &self,
        identity: Option<&PlayerId>,
        ip: &str,
        action: &str,
    ) -> StoreResult<()>;
}

fn join_cards(cards: &[crate::game::Card]) -> String {
    cards
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// PostgreSQL implementation of every store trait.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn stored_hand_from_row(row: &sqlx::postgres::PgRow) -> StoredHand {
    StoredHand {
        hand_id: row.get("hand_id"),
        table_id: row.get("table_id"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        sb: row.get("sb"),
        bb: row.get("bb"),
        button_seat: row.get("button_seat"),
        pot_total: row.get("pot_total"),
        community_cards: row.get("community_cards"),
        hand_history: row.get("hand_history"),
    }
}

fn player_record_from_row(row: &sqlx::postgres::PgRow) -> PlayerRecord {
    PlayerRecord {
        identity: row.get("identity"),
        handle: row.get("handle"),
        avatar_url: row.get("avatar_url"),
        lightning_address: row.get("lightning_address"),
        current_chips: row.get("current_chips"),
        hands_played: row.get("hands_played"),
        hands_won: row.get("hands_won"),
        total_winnings: row.get("total_winnings"),
        total_losses: row.get("total_losses"),
        is_banned: row.get("is_banned"),
        ban_reason: row.get("ban_reason"),
    }
}

const PLAYER_COLUMNS: &str = "identity, handle, avatar_url, lightning_address, current_chips, \
     hands_played, hands_won, total_winnings, total_losses, is_banned, ban_reason";

#[async_trait]
impl HandStore for PgStore {
    async fn save_hand(&self, table_id: TableId, record: &HandRecord) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            r#"
            INSERT INTO hands (table_id, started_at, completed_at, sb, bb,
                               button_seat, pot_total, community_cards, hand_history)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING hand_id
            "#,
        )
        .bind(table_id)
        .bind(record.started_at.timestamp())
        .bind(record.completed_at.timestamp())
        .bind(record.small_blind as i64)
        .bind(record.big_blind as i64)
        .bind(record.button_seat as i32)
        .bind(record.pot_total as i64)
        .bind(join_cards(&record.community))
        .bind(&record.history)
        .fetch_one(&mut *tx)
        .await?;
        let hand_id: i64 = row.get("hand_id");

        for p in &record.players {
            sqlx::query(
                r#"
                INSERT INTO hand_players (hand_id, identity, handle, seat_index,
                    starting_stack, ending_stack, total_committed, hole_cards,
                    final_hand, position, actions, won_amount)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(hand_id)
            .bind(p.id.as_str())
            .bind(&p.handle)
            .bind(p.seat as i32)
            .bind(p.starting_stack as i64)
            .bind(p.ending_stack as i64)
            .bind(p.total_committed as i64)
            .bind(join_cards(&p.hole_cards))
            .bind(&p.final_hand)
            .bind(&p.position)
            .bind(p.actions.join("; "))
            .bind(p.won_amount as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(hand_id)
    }

    async fn hand_by_id(
        &self,
        hand_id: i64,
    ) -> StoreResult<Option<(StoredHand, Vec<StoredHandPlayer>)>> {
        let Some(row) = sqlx::query("SELECT * FROM hands WHERE hand_id = $1")
            .bind(hand_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let hand = stored_hand_from_row(&row);
        let rows = sqlx::query("SELECT * FROM hand_players WHERE hand_id = $1 ORDER BY seat_index")
            .bind(hand_id)
            .fetch_all(&self.pool)
            .await?;
        let players = rows
            .iter()
            .map(|r| StoredHandPlayer {
                hand_id: r.get("hand_id"),
                identity: r.get("identity"),
                handle: r.get("handle"),
                seat_index: r.get("seat_index"),
                starting_stack: r.get("starting_stack"),
                ending_stack: r.get("ending_stack"),
                total_committed: r.get("total_committed"),
                hole_cards: r.get("hole_cards"),
                final_hand: r.get("final_hand"),
                position: r.get("position"),
                actions: r.get("actions"),
                won_amount: r.get("won_amount"),
            })
            .collect();
        Ok(Some((hand, players)))
    }

    async fn hands_by_identity(
        &self,
        identity: &PlayerId,
        limit: i64,
    ) -> StoreResult<Vec<StoredHand>> {
        let rows = sqlx::query(
            r#"
            SELECT h.* FROM hands h
            JOIN hand_players hp ON hp.hand_id = h.hand_id
            WHERE hp.identity = $1
            ORDER BY h.started_at DESC
            LIMIT $2
            "#,
        )
        .bind(identity.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(stored_hand_from_row).collect())
    }

    async fn hand_count(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM hands")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl PlayerStore for PgStore {
    async fn upsert_profile(&self, identity: &PlayerId, handle: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO players (identity, handle, first_seen, last_seen)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (identity)
            DO UPDATE SET handle = EXCLUDED.handle, last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(identity.as_str())
        .bind(handle)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn player(&self, identity: &PlayerId) -> StoreResult<Option<PlayerRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players WHERE identity = $1"
        ))
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| player_record_from_row(&r)))
    }

    async fn set_chips(&self, identity: &PlayerId, chips: i64) -> StoreResult<()> {
        sqlx::query("UPDATE players SET current_chips = $2 WHERE identity = $1")
            .bind(identity.as_str())
            .bind(chips)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_hand_result(
        &self,
        identity: &PlayerId,
        chips: i64,
        won_amount: i64,
        committed: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE players SET
                current_chips = $2,
                hands_played = hands_played + 1,
                hands_won = hands_won + CASE WHEN $3 > 0 THEN 1 ELSE 0 END,
                total_winnings = total_winnings + $3,
                total_losses = total_losses + $4,
                last_seen = $5
            WHERE identity = $1
            "#,
        )
        .bind(identity.as_str())
        .bind(chips)
        .bind(won_amount)
        .bind(committed)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_leave(&self, identity: &PlayerId, chips: i64) -> StoreResult<()> {
        sqlx::query(
            "UPDATE players SET current_chips = $2, left_at = $3 WHERE identity = $1",
        )
        .bind(identity.as_str())
        .bind(chips)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ban(&self, identity: &PlayerId, reason: &str, banned_by: &str) -> StoreResult<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO players (identity, handle, first_seen, last_seen, is_banned, ban_reason)
            VALUES ($1, '', $3, $3, TRUE, $2)
            ON CONFLICT (identity)
            DO UPDATE SET is_banned = TRUE, ban_reason = $2
            "#,
        )
        .bind(identity.as_str())
        .bind(format!("{reason} (by {banned_by})"))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unban(&self, identity: &PlayerId) -> StoreResult<()> {
        sqlx::query(
            "UPDATE players SET is_banned = FALSE, ban_reason = NULL WHERE identity = $1",
        )
        .bind(identity.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ban_reason(&self, identity: &PlayerId) -> StoreResult<Option<String>> {
        let row = sqlx::query(
            "SELECT ban_reason FROM players WHERE identity = $1 AND is_banned = TRUE",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            r.get::<Option<String>, _>("ban_reason")
                .unwrap_or_else(|| "banned".to_string())
        }))
    }

    async fn ban_ip(&self, ip: &str, reason: &str, banned_by: &str) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ip_bans (ip, reason, banned_by, banned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (ip) DO UPDATE SET reason = $2, banned_by = $3, banned_at = $4
            "#,
        )
        .bind(ip)
        .bind(reason)
        .bind(banned_by)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unban_ip(&self, ip: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM ip_bans WHERE ip = $1")
            .bind(ip)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn is_ip_banned(&self, ip: &str) -> StoreResult<bool> {
        let row = sqlx::query("SELECT 1 AS x FROM ip_bans WHERE ip = $1")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn set_session(
        &self,
        identity: &PlayerId,
        token: &str,
        expires_at: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE players SET session_token = $2, session_expires = $3 WHERE identity = $1",
        )
        .bind(identity.as_str())
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn player_by_session(
        &self,
        token: &str,
        now: i64,
    ) -> StoreResult<Option<PlayerRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PLAYER_COLUMNS} FROM players \
             WHERE session_token = $1 AND session_expires > $2"
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| player_record_from_row(&r)))
    }

    async fn clear_expired_sessions(&self, now: i64) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE players SET session_token = NULL, session_expires = NULL \
             WHERE session_expires IS NOT NULL AND session_expires <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn player_count(&self) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM players")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn create_challenge(&self, row: &ChallengeRow) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO challenges (challenge_id, nonce, expires_at, used) VALUES ($1, $2, $3, FALSE)",
        )
        .bind(&row.challenge_id)
        .bind(&row.nonce)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_challenge(
        &self,
        challenge_id: &str,
        now: i64,
    ) -> StoreResult<Option<ChallengeRow>> {
        // Single-statement consume: replay attempts race on `used`.
        let row = sqlx::query(
            r#"
            UPDATE challenges SET used = TRUE
            WHERE challenge_id = $1 AND used = FALSE AND expires_at > $2
            RETURNING challenge_id, nonce, expires_at, used
            "#,
        )
        .bind(challenge_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ChallengeRow {
            challenge_id: r.get("challenge_id"),
            nonce: r.get("nonce"),
            expires_at: r.get("expires_at"),
            used: r.get("used"),
        }))
    }

    async fn purge_expired_challenges(&self, now: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM challenges WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AbuseStore for PgStore {
    async fn record_abuse(
        &self,
        identity: Option<&PlayerId>,
        ip: &str,
        action: &str,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO abuse_log (identity, ip, action, timestamp) VALUES ($1, $2, $3, $4)",
        )
        .bind(identity.map(|i| i.as_str()))
        .bind(ip)
        .bind(action)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
