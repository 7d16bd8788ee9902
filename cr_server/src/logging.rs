//! Structured logging configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging.
///
/// Log levels come from `RUST_LOG`; the default keeps sqlx and hyper
/// quiet at `warn` while the application logs at `info`.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("structured logging initialized");
}

/// Log a security-relevant event with structured fields.
pub fn log_security_event(
    event_type: &str,
    identity: Option<&str>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        identity = identity,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}
