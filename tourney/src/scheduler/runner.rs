//! Task runner: claims due tasks and routes them to handlers by action.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::{
    SchedulerResult, TaskScheduler,
    models::{FailureDisposition, RunReport, RunnerConfig, ScheduledTask, TaskOutcome, TaskRun},
};

/// Error returned by a task handler; the task is retried
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Consumer of one task action
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the task. Delivery is at-least-once, so handlers must tolerate
    /// being called again for a task that already took effect.
    async fn handle(&self, task: &ScheduledTask) -> Result<(), HandlerError>;
}

/// Routes claimed tasks to registered handlers
pub struct TaskRunner {
    scheduler: TaskScheduler,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
    config: RunnerConfig,
}

impl TaskRunner {
    pub fn new(scheduler: TaskScheduler, config: RunnerConfig) -> Self {
        Self {
            scheduler,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register the handler for an action, replacing any earlier one
    pub fn register(&mut self, action: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(action.into(), handler);
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Claim one batch of due tasks and run them sequentially
    pub async fn run_once(&self, now: DateTime<Utc>) -> SchedulerResult<RunReport> {
        let tasks = self
            .scheduler
            .claim_due(now, self.config.batch_size, self.config.lease)
            .await?;

        let mut report = RunReport::default();
        for task in tasks {
            let started = Instant::now();
            let outcome = self.run_task(&task, now).await?;
            report.runs.push(TaskRun {
                task_id: task.id,
                action: task.action.clone(),
                outcome,
                elapsed: started.elapsed(),
            });
        }

        Ok(report)
    }

    async fn run_task(&self, task: &ScheduledTask, now: DateTime<Utc>) -> SchedulerResult<TaskOutcome> {
        let result = match self.handlers.get(&task.action) {
            Some(handler) => handler.handle(task).await,
            None => Err(format!("no handler registered for action '{}'", task.action).into()),
        };

        match result {
            Ok(()) => {
                if self.scheduler.complete(task).await? {
                    Ok(TaskOutcome::Completed)
                } else {
                    Ok(TaskOutcome::Superseded)
                }
            }
            Err(e) => {
                let message = e.to_string();
                let disposition = self
                    .scheduler
                    .fail(
                        task,
                        &message,
                        self.config.max_attempts,
                        self.config.retry_backoff,
                        now,
                    )
                    .await?;

                Ok(match disposition {
                    FailureDisposition::Retrying { next_run } => {
                        warn!(
                            "Task {} ({}) attempt {} failed, retrying at {}: {}",
                            task.id, task.dedupe_key, task.attempts, next_run, message
                        );
                        TaskOutcome::Retrying
                    }
                    FailureDisposition::Exhausted => {
                        error!(
                            "Task {} ({}) failed after {} attempts: {}",
                            task.id, task.dedupe_key, task.attempts, message
                        );
                        TaskOutcome::Failed
                    }
                    FailureDisposition::Superseded => TaskOutcome::Superseded,
                })
            }
        }
    }
}
