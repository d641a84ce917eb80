//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; the subscriber installed here
//! bridges those records into `tracing` so both end up in one stream.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Operations slower than this are logged at warn level
pub const SLOW_OPERATION_MS: u64 = 1000;

/// Initialize structured logging
///
/// Log levels come from `RUST_LOG` (default `info,sqlx=warn`).
///
/// # Example
///
/// ```no_run
/// use tourney_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Worker starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log how long an operation took; slow ones are raised to warn
///
/// # Example
///
/// ```
/// use tourney_server::logging::log_performance;
/// use std::time::Instant;
///
/// let start = Instant::now();
/// // ... do work ...
/// let duration = start.elapsed().as_millis() as u64;
/// log_performance("release_credentials", duration, Some("task 7"));
/// ```
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > SLOW_OPERATION_MS {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "Performance metric"
        );
    }
}

/// Log a task that will not be retried again
pub fn log_task_failure(task_id: i64, action: &str, message: &str) {
    tracing::error!(
        task_id = task_id,
        action = action,
        "TASK FAILED: {}",
        message
    );
}
