//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated
//! configuration. The admin token is mandatory: the server refuses to
//! start without one.

use card_room::{db::DatabaseConfig, session::CoordinatorConfig, TableConfig};
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Shared secret gating the admin surface (required)
    pub admin_token: String,
    /// Allowed CORS origins; empty means same-origin only
    pub cors_origins: Vec<String>,
    /// Per-table game configuration
    pub table: TableConfig,
    /// Coordinator timing and limits
    pub coordinator: CoordinatorConfig,
    /// Number of tables to spawn on startup
    pub num_tables: usize,
    /// Challenge lifetime in seconds
    pub challenge_ttl_s: i64,
    /// Session token lifetime in seconds
    pub session_ttl_s: i64,
    /// Metrics exporter bind address, if enabled
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables, with optional CLI
    /// overrides for the bind address, database URL, and table count.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        num_tables_override: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let port: u16 = parse_env_or("PORT", 4545);
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                format!("127.0.0.1:{port}")
                    .parse()
                    .expect("default bind address is valid")
            });

        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| "postgres://postgres@localhost/card_room".to_string());
        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT", 10),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", 600),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", 1800),
        };

        let admin_token = std::env::var("ADMIN_TOKEN").map_err(|_| ConfigError::MissingRequired {
            var: "ADMIN_TOKEN".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;
        if admin_token.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "ADMIN_TOKEN".to_string(),
                reason: "must be at least 16 characters".to_string(),
            });
        }

        let cors_origins = std::env::var("CORS_ORIGIN")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let table = TableConfig {
            num_seats: parse_env_or("NUM_SEATS", 6),
            small_blind: parse_env_or("SMALL_BLIND", 50),
            big_blind: parse_env_or("BIG_BLIND", 100),
            starting_stack: parse_env_or("STARTING_STACK", 10_000),
            min_buyin: parse_env_or("MIN_BUYIN", 2_000),
            max_buyin: parse_env_or("MAX_BUYIN", 10_000),
            base_action_ms: parse_env_or("BASE_ACTION_MS", 15_000),
            default_time_bank_ms: parse_env_or("DEFAULT_TIME_BANK_MS", 15_000),
            time_bank_cap_ms: parse_env_or("TIME_BANK_CAP_MS", 60_000),
            time_bank_growth_ms: parse_env_or("TIME_BANK_GROWTH_MS", 5_000),
            time_bank_growth_hands: parse_env_or("TIME_BANK_GROWTH_HANDS", 10),
            sit_out_kick_ms: parse_env_or("SIT_OUT_KICK_MS", 300_000),
            disconnect_grace_ms: parse_env_or("DISCONNECT_GRACE_MS", 60_000),
            reconnect_swap_grace_ms: parse_env_or("RECONNECT_SWAP_GRACE_MS", 10_000),
            rathole_window_ms: parse_env_or("RATHOLE_WINDOW_MS", 7_200_000),
            hand_start_delay_ms: parse_env_or("HAND_START_DELAY_MS", 2_000),
            runout_delays_ms: [2_000, 2_000, 3_000, 2_000],
        };

        let coordinator = CoordinatorConfig {
            default_buy_in: table.starting_stack,
            reconnect_swap_grace_ms: table.reconnect_swap_grace_ms,
            disconnect_grace_ms: table.disconnect_grace_ms,
            chat_max_len: parse_env_or("CHAT_MAX_LEN", 280),
        };

        let num_tables = num_tables_override.unwrap_or_else(|| parse_env_or("NUM_TABLES", 1));

        let metrics_bind = std::env::var("METRICS_BIND")
            .ok()
            .and_then(|s| s.parse().ok());

        Ok(ServerConfig {
            bind,
            database,
            admin_token,
            cors_origins,
            table,
            coordinator,
            num_tables,
            challenge_ttl_s: parse_env_or("CHALLENGE_TTL_S", 300),
            session_ttl_s: parse_env_or("SESSION_TTL_S", 86_400),
            metrics_bind,
        })
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.table.validate().map_err(|reason| ConfigError::Invalid {
            var: "table configuration".to_string(),
            reason,
        })?;
        if self.num_tables == 0 {
            return Err(ConfigError::Invalid {
                var: "NUM_TABLES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.challenge_ttl_s <= 0 || self.session_ttl_s <= 0 {
            return Err(ConfigError::Invalid {
                var: "CHALLENGE_TTL_S/SESSION_TTL_S".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
