//! Worker configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::net::SocketAddr;
use std::time::Duration;

use tourney::db::DatabaseConfig;
use tourney::scheduler::RunnerConfig;

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Delay between scheduler polls
    pub poll_interval: Duration,
    /// Claim batch, lease and retry policy
    pub runner: RunnerConfig,
    /// Prometheus listener; metrics are not exported when unset
    pub metrics_bind: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL (from `--db-url`)
    /// * `poll_ms_override` - Optional poll interval in milliseconds (from `--poll-ms`)
    /// * `metrics_override` - Optional metrics listener (from `--metrics`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when `METRICS_BIND` is set but is not
    /// a socket address.
    pub fn from_env(
        database_url_override: Option<String>,
        poll_ms_override: Option<u64>,
        metrics_override: Option<SocketAddr>,
    ) -> Result<Self, ConfigError> {
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let poll_ms = poll_ms_override.unwrap_or_else(|| parse_env_or("SCHEDULER_POLL_INTERVAL_MS", 1000));

        let defaults = RunnerConfig::default();
        let runner = RunnerConfig {
            batch_size: parse_env_or("SCHEDULER_BATCH_SIZE", defaults.batch_size),
            lease: parse_env::<u64>("SCHEDULER_LEASE_SECS").map_or(defaults.lease, Duration::from_secs),
            max_attempts: parse_env_or("SCHEDULER_MAX_ATTEMPTS", defaults.max_attempts),
            retry_backoff: defaults.retry_backoff,
        };

        let metrics_bind = match metrics_override {
            Some(addr) => Some(addr),
            None => match std::env::var("METRICS_BIND") {
                Ok(value) if !value.trim().is_empty() => {
                    Some(value.trim().parse().map_err(|_| ConfigError::Invalid {
                        var: "METRICS_BIND".to_string(),
                        reason: format!("'{value}' is not an IP:PORT address"),
                    })?)
                }
                _ => None,
            },
        };

        Ok(ServerConfig {
            database,
            poll_interval: Duration::from_millis(poll_ms),
            runner,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "Use sqlite://tourney.db for a local file".to_string(),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_POLL_INTERVAL_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.runner.batch_size < 1 {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_BATCH_SIZE".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.runner.max_attempts < 1 {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_MAX_ATTEMPTS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        // Leases must outlive one poll
        if self.runner.lease <= self.poll_interval {
            return Err(ConfigError::Invalid {
                var: "SCHEDULER_LEASE_SECS".to_string(),
                reason: format!(
                    "Must be longer than the poll interval ({} ms)",
                    self.poll_interval.as_millis()
                ),
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

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_env(key).unwrap_or(default)
}
