//! Query timeout helpers.
//!
//! The deferred-task worker polls the database on a fixed cadence; a stuck
//! poll must not stall the loop, so claims are bounded by these helpers.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for a single query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for claiming a batch of due tasks
pub const TASK_CLAIM_TIMEOUT: Duration = Duration::from_secs(10);

/// Error type for timeout-bounded operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError {
    /// Operation timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TimeoutError {
    /// Whether the deadline elapsed (as opposed to the query failing)
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}

/// Result type for timeout-bounded operations
pub type TimeoutResult<T> = Result<T, TimeoutError>;

/// Run a database future with a deadline
///
/// ```no_run
/// use tourney::db::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// # use sqlx::SqlitePool;
/// # async fn example(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
/// let row = with_timeout(
///     DEFAULT_QUERY_TIMEOUT,
///     sqlx::query("SELECT id FROM tournaments WHERE id = ?1")
///         .bind(1_i64)
///         .fetch_optional(pool),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> TimeoutResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(TimeoutError::Database),
        Err(_) => Err(TimeoutError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let value = with_timeout(DEFAULT_QUERY_TIMEOUT, async { Ok::<_, sqlx::Error>(7) })
            .await
            .expect("should complete");
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_reports_timeout() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, sqlx::Error>(())
        })
        .await
        .expect_err("should time out");

        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
    }
}
