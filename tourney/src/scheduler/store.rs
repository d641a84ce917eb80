//! Durable task table.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::time::Duration;

use crate::db::timeouts::{TASK_CLAIM_TIMEOUT, with_timeout};

use super::{
    SchedulerError, SchedulerResult,
    models::{FailureDisposition, ScheduledTask, TaskHandle, TaskId, TaskStatus},
};

const TASK_COLUMNS: &str = "id, action, dedupe_key, payload, run_at_ms, status, attempts, last_error";

fn to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn task_from_row(row: &SqliteRow) -> SchedulerResult<ScheduledTask> {
    let payload: String = row.get("payload");
    Ok(ScheduledTask {
        id: row.get("id"),
        action: row.get("action"),
        dedupe_key: row.get("dedupe_key"),
        payload: serde_json::from_str(&payload)?,
        run_at: to_datetime(row.get("run_at_ms")),
        status: TaskStatus::parse(&row.get::<String, _>("status")),
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
    })
}

/// Scheduler port backed by the `scheduled_tasks` table
#[derive(Clone)]
pub struct TaskScheduler {
    pool: SqlitePool,
}

impl TaskScheduler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Schedule `action` to run at `run_at`
    ///
    /// Scheduling again with the same `dedupe_key` replaces the earlier task:
    /// its payload and due time are overwritten and it returns to pending.
    pub async fn schedule_at(
        &self,
        run_at: DateTime<Utc>,
        action: &str,
        dedupe_key: &str,
        payload: &serde_json::Value,
    ) -> SchedulerResult<TaskHandle> {
        if action.is_empty() || dedupe_key.is_empty() {
            return Err(SchedulerError::InvalidTask(
                "action and dedupe key are required".to_string(),
            ));
        }

        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (action, dedupe_key, payload, run_at_ms, status, attempts, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?5)
            ON CONFLICT (dedupe_key) DO UPDATE SET
                action = excluded.action,
                payload = excluded.payload,
                run_at_ms = excluded.run_at_ms,
                status = 'pending',
                attempts = 0,
                lease_until_ms = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(action)
        .bind(dedupe_key)
        .bind(serde_json::to_string(payload)?)
        .bind(run_at.timestamp_millis())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(TaskHandle {
            id: row.get("id"),
            dedupe_key: dedupe_key.to_string(),
            run_at: to_datetime(run_at.timestamp_millis()),
        })
    }

    /// Claim due tasks and expired leases, oldest first
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: i64,
        lease: Duration,
    ) -> SchedulerResult<Vec<ScheduledTask>> {
        let now_ms = now.timestamp_millis();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);

        let sql = format!(
            r#"
            UPDATE scheduled_tasks
            SET status = 'running',
                attempts = attempts + 1,
                lease_until_ms = ?1,
                updated_at = ?2
            WHERE id IN (
                SELECT id FROM scheduled_tasks
                WHERE (status = 'pending' AND run_at_ms <= ?3)
                   OR (status = 'running' AND lease_until_ms <= ?3)
                ORDER BY run_at_ms, id
                LIMIT ?4
            )
            RETURNING {TASK_COLUMNS}
            "#
        );
        let claim = sqlx::query(&sql)
            .bind(now_ms.saturating_add(lease_ms))
            .bind(now)
            .bind(now_ms)
            .bind(limit)
            .fetch_all(&self.pool);
        let rows = with_timeout(TASK_CLAIM_TIMEOUT, claim).await?;

        let mut tasks = rows
            .iter()
            .map(task_from_row)
            .collect::<SchedulerResult<Vec<_>>>()?;
        tasks.sort_by_key(|t| (t.run_at, t.id));

        Ok(tasks)
    }

    /// Mark a claimed task done
    ///
    /// Returns false when the task was rescheduled while it ran; the new
    /// schedule stays pending.
    pub async fn complete(&self, task: &ScheduledTask) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET status = 'done', lease_until_ms = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'running' AND attempts = ?3 AND run_at_ms = ?4",
        )
        .bind(Utc::now())
        .bind(task.id)
        .bind(task.attempts)
        .bind(task.run_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a failed run and either retry with backoff or give up
    pub async fn fail(
        &self,
        task: &ScheduledTask,
        error: &str,
        max_attempts: i64,
        backoff: Duration,
        now: DateTime<Utc>,
    ) -> SchedulerResult<FailureDisposition> {
        let (status, next_run, disposition) = if task.attempts >= max_attempts {
            (TaskStatus::Failed, task.run_at, FailureDisposition::Exhausted)
        } else {
            let exponent = u32::try_from(task.attempts.saturating_sub(1)).unwrap_or(u32::MAX);
            let delay = backoff.saturating_mul(2u32.saturating_pow(exponent));
            let next_run = chrono::Duration::from_std(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            (
                TaskStatus::Pending,
                next_run,
                FailureDisposition::Retrying { next_run },
            )
        };

        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET status = ?1, run_at_ms = ?2, lease_until_ms = NULL, last_error = ?3, updated_at = ?4
             WHERE id = ?5 AND status = 'running' AND attempts = ?6 AND run_at_ms = ?7",
        )
        .bind(status.as_str())
        .bind(next_run.timestamp_millis())
        .bind(error)
        .bind(now)
        .bind(task.id)
        .bind(task.attempts)
        .bind(task.run_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(FailureDisposition::Superseded);
        }
        Ok(disposition)
    }

    /// Look up a task by id
    pub async fn get(&self, id: TaskId) -> SchedulerResult<Option<ScheduledTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// Look up a task by dedupe key
    pub async fn find_by_key(&self, dedupe_key: &str) -> SchedulerResult<Option<ScheduledTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE dedupe_key = ?1"
        ))
        .bind(dedupe_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    /// Number of tasks still waiting to run
    pub async fn pending_count(&self) -> SchedulerResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS pending FROM scheduled_tasks WHERE status IN ('pending', 'running')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("pending"))
    }
}
