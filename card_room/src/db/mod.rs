//! Persistence: PostgreSQL connection pooling, schema bootstrap, and
//! the repository traits the engine talks through.
//!
//! The engine only sees the traits in [`repository`]; production wires
//! the Pg implementations, tests wire [`memory::MemoryStore`]. Archive
//! failures must never stop a live game, so callers log and swallow
//! [`StoreError`]s on the hot path.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};

pub mod config;
pub mod errors;
pub mod memory;
pub mod repository;

pub use config::DatabaseConfig;
pub use errors::{StoreError, StoreResult};
pub use repository::{
    AbuseStore, ChallengeStore, HandStore, PgStore, PlayerStore,
};

/// Table ID type
pub type TableId = i64;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create the tables and indices this process needs if they do not
    /// exist yet. Idempotent.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS hands (
        hand_id        BIGSERIAL PRIMARY KEY,
        table_id       BIGINT NOT NULL,
        started_at     BIGINT NOT NULL,
        completed_at   BIGINT NOT NULL,
        sb             BIGINT NOT NULL,
        bb             BIGINT NOT NULL,
        button_seat    INT NOT NULL,
        pot_total      BIGINT NOT NULL,
        community_cards TEXT NOT NULL,
        hand_history   TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hands_table_started ON hands (table_id, started_at)",
    r#"
    CREATE TABLE IF NOT EXISTS hand_players (
        hand_id        BIGINT NOT NULL REFERENCES hands (hand_id),
        identity       TEXT NOT NULL,
        handle         TEXT NOT NULL,
        seat_index     INT NOT NULL,
        starting_stack BIGINT NOT NULL,
        ending_stack   BIGINT NOT NULL,
        total_committed BIGINT NOT NULL,
        hole_cards     TEXT NOT NULL,
        final_hand     TEXT,
        position       TEXT NOT NULL,
        actions        TEXT NOT NULL,
        won_amount     BIGINT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_hand_players_identity ON hand_players (identity)",
    r#"
    CREATE TABLE IF NOT EXISTS players (
        identity        TEXT PRIMARY KEY,
        handle          TEXT NOT NULL,
        avatar_url      TEXT,
        lightning_address TEXT,
        current_chips   BIGINT NOT NULL DEFAULT 0,
        hands_played    BIGINT NOT NULL DEFAULT 0,
        hands_won       BIGINT NOT NULL DEFAULT 0,
        total_winnings  BIGINT NOT NULL DEFAULT 0,
        total_losses    BIGINT NOT NULL DEFAULT 0,
        first_seen      BIGINT NOT NULL,
        last_seen       BIGINT NOT NULL,
        is_banned       BOOLEAN NOT NULL DEFAULT FALSE,
        ban_reason      TEXT,
        left_at         BIGINT,
        session_token   TEXT,
        session_expires BIGINT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_players_session ON players (session_token)",
    r#"
    CREATE TABLE IF NOT EXISTS ip_bans (
        ip        TEXT PRIMARY KEY,
        reason    TEXT,
        banned_by TEXT,
        banned_at BIGINT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS challenges (
        challenge_id TEXT PRIMARY KEY,
        nonce        TEXT NOT NULL,
        expires_at   BIGINT NOT NULL,
        used         BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS abuse_log (
        id        BIGSERIAL PRIMARY KEY,
        identity  TEXT,
        ip        TEXT,
        action    TEXT NOT NULL,
        timestamp BIGINT NOT NULL
    )
    "#,
];

/// The bundle of repositories the engine and server share. Cloneable;
/// every field is an `Arc` to a trait object, so tests swap in the
/// in-memory implementations wholesale.
#[derive(Clone)]
pub struct Stores {
    pub hands: Arc<dyn HandStore>,
    pub players: Arc<dyn PlayerStore>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub abuse: Arc<dyn AbuseStore>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            hands: store.clone(),
            players: store.clone(),
            challenges: store.clone(),
            abuse: store,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            hands: store.clone(),
            players: store.clone(),
            challenges: store.clone(),
            abuse: store,
        }
    }
}
