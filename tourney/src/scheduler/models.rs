//! Scheduled task models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduled task ID type
pub type TaskId = i64;

/// Task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "running" => TaskStatus::Running,
            "done" => TaskStatus::Done,
            "failed" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }
}

/// Durable deferred task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub action: String,
    pub dedupe_key: String,
    pub payload: serde_json::Value,
    pub run_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Incremented on every claim
    pub attempts: i64,
    pub last_error: Option<String>,
}

/// Receipt returned by `schedule_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub id: TaskId,
    pub dedupe_key: String,
    pub run_at: DateTime<Utc>,
}

/// What happened to a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to pending, due again at the given time
    Retrying { next_run: DateTime<Utc> },
    /// Attempts exhausted
    Exhausted,
    /// The task was rescheduled or completed elsewhere while running
    Superseded,
}

/// Worker tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Tasks claimed per poll
    pub batch_size: i64,
    /// How long a claim is held before another worker may take it
    pub lease: Duration,
    /// Attempts before a task is marked failed
    pub max_attempts: i64,
    /// Delay before the first retry; doubles per attempt
    pub retry_backoff: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            lease: Duration::from_secs(60),
            max_attempts: 5,
            retry_backoff: Duration::from_secs(5),
        }
    }
}

/// Result of running one claimed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Retrying,
    Failed,
    Superseded,
}

/// Per-task record produced by a runner pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub task_id: TaskId,
    pub action: String,
    pub outcome: TaskOutcome,
    pub elapsed: Duration,
}

/// Summary of one runner pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub runs: Vec<TaskRun>,
}

impl RunReport {
    pub fn claimed(&self) -> usize {
        self.runs.len()
    }

    pub fn count(&self, outcome: TaskOutcome) -> usize {
        self.runs.iter().filter(|r| r.outcome == outcome).count()
    }
}
