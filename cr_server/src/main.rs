//! Multi-table card room server.
//!
//! Spawns one actor task per table, a single session coordinator owning
//! all connection/identity/seat mappings, and an axum HTTP + WebSocket
//! front. Authentication is challenge/response against an external
//! signature scheme; persistence is PostgreSQL.

use cr_server::{api, config::ServerConfig, logging, metrics};

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{atomic::AtomicU64, Arc},
};

use anyhow::Error;
use card_room::{
    auth::{AuthManager, SchnorrVerifier},
    db::{Database, Stores},
    session::{Coordinator, CoordinatorMessage},
    table::TableActor,
};
use pico_args::Arguments;

const HELP: &str = "\
Run a multi-table card room server

USAGE:
  cr_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:4545]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --tables     N           Number of tables to create  [default: env NUM_TABLES or 1]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND / PORT       Bind address or port
  DATABASE_URL             PostgreSQL connection string
  ADMIN_TOKEN              Shared secret for the admin surface (required)
  CORS_ORIGIN              Comma-separated allowed origins
  SMALL_BLIND, BIG_BLIND, STARTING_STACK, MIN_BUYIN, MAX_BUYIN,
  NUM_SEATS, BASE_ACTION_MS, DEFAULT_TIME_BANK_MS, TIME_BANK_CAP_MS,
  TIME_BANK_GROWTH_MS, TIME_BANK_GROWTH_HANDS, SIT_OUT_KICK_MS,
  DISCONNECT_GRACE_MS, RECONNECT_SWAP_GRACE_MS, RATHOLE_WINDOW_MS,
  CHALLENGE_TTL_S, SESSION_TTL_S, METRICS_BIND
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // .env values never override real environment variables.
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;
    let tables_override: Option<usize> = pargs.opt_value_from_str("--tables")?;

    logging::init();

    let config = ServerConfig::from_env(bind_override, db_url_override, tables_override)
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;
    tracing::info!("configuration loaded and validated");

    if let Some(addr) = config.metrics_bind {
        match metrics::init_metrics(addr) {
            Ok(()) => tracing::info!("metrics endpoint at http://{addr}/metrics"),
            Err(e) => tracing::warn!("metrics disabled: {e}"),
        }
    }

    tracing::info!("connecting to database");
    let db = Database::new(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("failed to connect to database: {e}"))?;
    db.ensure_schema()
        .await
        .map_err(|e| anyhow::anyhow!("failed to prepare schema: {e}"))?;
    let stores = Stores::postgres(db.pool().clone());
    tracing::info!("database ready");

    let auth_manager = AuthManager::new(stores.clone(), Arc::new(SchnorrVerifier))
        .with_ttls(config.challenge_ttl_s, config.session_ttl_s);

    let (coordinator, coordinator_handle) =
        Coordinator::new(config.coordinator.clone(), stores.clone());
    tokio::spawn(coordinator.run());

    let mut tables = HashMap::new();
    for i in 0..config.num_tables {
        let table_id = (i + 1) as i64;
        let (actor, handle) = TableActor::new(
            table_id,
            config.table.clone(),
            stores.clone(),
            coordinator_handle.table_outbound(),
        );
        tokio::spawn(actor.run());
        coordinator_handle
            .send(CoordinatorMessage::RegisterTable {
                table_id,
                handle: Some(handle.clone()),
            })
            .await;
        tables.insert(table_id, handle);
        tracing::info!("table {table_id} up ({}-seat, blinds {}/{})",
            config.table.num_seats, config.table.small_blind, config.table.big_blind);
    }

    // Hourly sweeper for expired challenges and sessions.
    let sweeper = auth_manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match sweeper.cleanup_expired().await {
                Ok((challenges, sessions)) => {
                    if challenges + sessions > 0 {
                        tracing::info!(
                            "swept {challenges} expired challenge(s), {sessions} session(s)"
                        );
                    }
                }
                Err(e) => tracing::error!("cleanup sweep failed: {e}"),
            }
        }
    });

    let state = api::AppState {
        auth_manager,
        coordinator: coordinator_handle,
        stores,
        tables: Arc::new(tables),
        admin_token: config.admin_token.clone(),
        next_conn_id: Arc::new(AtomicU64::new(1)),
    };
    let app = api::create_router(state, &config.cors_origins);

    tracing::info!("listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", config.bind))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

    tracing::info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
