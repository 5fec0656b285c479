//! # Structured Logging Module
//!
//! Environment-aware structured logging for decommission milestones and
//! per-range streaming activity.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` wins over the environment default when set. Calling this more
/// than once, or after another subscriber was installed, is harmless.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if use_json_format() {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("DECOMMISSION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn use_json_format() -> bool {
    std::env::var("DECOMMISSION_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log a node-level decommission milestone
pub fn log_decommission_operation(
    operation: &str,
    node_id: &str,
    attempt_id: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        node_id = %node_id,
        attempt_id = attempt_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "DECOMMISSION_OPERATION"
    );
}

/// Log a per-range transfer milestone
pub fn log_transfer_operation(
    operation: &str,
    node_id: &str,
    keyspace: &str,
    range: &str,
    target: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::debug!(
        operation = %operation,
        node_id = %node_id,
        keyspace = %keyspace,
        range = %range,
        target = %target,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TRANSFER_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
