//! Durable deferred-task scheduler.
//!
//! Tasks live in the `scheduled_tasks` table so they survive restarts. A
//! worker claims due tasks under a lease; a lease that expires before the
//! task completes is claimed again, giving at-least-once delivery. A
//! `dedupe_key` identifies the logical job, and scheduling the same key
//! again replaces the earlier schedule.

pub mod models;
pub mod runner;
pub mod store;

use thiserror::Error;

use crate::db::timeouts::TimeoutError;

pub use models::{
    FailureDisposition, RunReport, RunnerConfig, ScheduledTask, TaskHandle, TaskId, TaskOutcome,
    TaskRun, TaskStatus,
};
pub use runner::{HandlerError, TaskHandler, TaskRunner};
pub use store::TaskScheduler;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Claim timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid task payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid task: {0}")]
    InvalidTask(String),
}

impl From<TimeoutError> for SchedulerError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(d) => SchedulerError::Timeout(d),
            TimeoutError::Database(e) => SchedulerError::Database(e),
        }
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_supersedes_earlier_schedule() {
        let db = Database::in_memory().await.unwrap();
        let scheduler = TaskScheduler::new(db.pool().clone());
        let now = Utc::now();

        let first = scheduler
            .schedule_at(now + ChronoDuration::minutes(5), "ping", "ping:1", &json!({"n": 1}))
            .await
            .unwrap();
        let second = scheduler
            .schedule_at(now + ChronoDuration::minutes(9), "ping", "ping:1", &json!({"n": 2}))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(scheduler.pending_count().await.unwrap(), 1);

        let task = scheduler.find_by_key("ping:1").await.unwrap().unwrap();
        assert_eq!(task.payload, json!({"n": 2}));
        assert_eq!(task.run_at, second.run_at);
    }

    #[tokio::test]
    async fn test_claim_respects_due_time_and_lease() {
        let db = Database::in_memory().await.unwrap();
        let scheduler = TaskScheduler::new(db.pool().clone());
        let now = Utc::now();

        scheduler
            .schedule_at(now + ChronoDuration::minutes(5), "ping", "ping:2", &json!({}))
            .await
            .unwrap();

        assert!(scheduler.claim_due(now, 10, Duration::from_secs(30)).await.unwrap().is_empty());

        let due = now + ChronoDuration::minutes(5);
        let claimed = scheduler.claim_due(due, 10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);

        // Lease still held
        let again = due + ChronoDuration::seconds(10);
        assert!(scheduler.claim_due(again, 10, Duration::from_secs(30)).await.unwrap().is_empty());

        // Lease expired: redelivered
        let expired = due + ChronoDuration::seconds(31);
        let reclaimed = scheduler.claim_due(expired, 10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);

        assert!(scheduler.complete(&reclaimed[0]).await.unwrap());
        // Stale claim from the first delivery no longer matches
        assert!(!scheduler.complete(&claimed[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_retries_then_exhausts() {
        let db = Database::in_memory().await.unwrap();
        let scheduler = TaskScheduler::new(db.pool().clone());
        let now = Utc::now();

        scheduler.schedule_at(now, "ping", "ping:3", &json!({})).await.unwrap();

        let task = scheduler.claim_due(now, 1, Duration::from_secs(30)).await.unwrap().remove(0);
        let disposition = scheduler
            .fail(&task, "boom", 2, Duration::from_secs(1), now)
            .await
            .unwrap();
        assert!(matches!(disposition, FailureDisposition::Retrying { .. }));

        let later = now + ChronoDuration::seconds(1);
        let task = scheduler.claim_due(later, 1, Duration::from_secs(30)).await.unwrap().remove(0);
        assert_eq!(task.attempts, 2);
        let disposition = scheduler
            .fail(&task, "boom again", 2, Duration::from_secs(1), later)
            .await
            .unwrap();
        assert_eq!(disposition, FailureDisposition::Exhausted);

        let stored = scheduler.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("boom again"));
    }
}
