//! Scheduler poll loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tourney::notifications::NotificationDispatcher;
use tourney::scheduler::{
    RunReport, RunnerConfig, SchedulerResult, TaskOutcome, TaskRunner, TaskScheduler,
};
use tourney::tournament::{CredentialRelease, RELEASE_CREDENTIALS_ACTION};

use crate::logging::{log_performance, log_task_failure};
use crate::metrics;

/// Claims due tasks on a fixed interval and runs their handlers
pub struct Worker {
    runner: TaskRunner,
    scheduler: TaskScheduler,
    poll_interval: Duration,
}

impl Worker {
    /// Worker with every engine task handler registered
    pub fn new(
        pool: Arc<SqlitePool>,
        dispatcher: NotificationDispatcher,
        runner_config: RunnerConfig,
        poll_interval: Duration,
    ) -> Self {
        let scheduler = TaskScheduler::new(pool.as_ref().clone());
        let mut runner = TaskRunner::new(scheduler.clone(), runner_config);
        runner.register(
            RELEASE_CREDENTIALS_ACTION,
            Arc::new(CredentialRelease::new(pool, dispatcher)),
        );

        Self {
            runner,
            scheduler,
            poll_interval,
        }
    }

    /// One poll as of `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> SchedulerResult<RunReport> {
        let report = self.runner.run_once(now).await?;
        metrics::record_report(&report);

        for run in &report.runs {
            let elapsed_ms = u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX);
            log_performance(&run.action, elapsed_ms, Some(&format!("task {}", run.task_id)));
            if run.outcome == TaskOutcome::Failed {
                log_task_failure(run.task_id, &run.action, "attempts exhausted");
            }
        }

        metrics::tasks_pending(self.scheduler.pending_count().await?);
        Ok(report)
    }

    /// Poll until `shutdown` flips to true or its sender is dropped
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Scheduler worker started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) if report.claimed() > 0 => tracing::info!(
                            claimed = report.claimed(),
                            completed = report.count(TaskOutcome::Completed),
                            retrying = report.count(TaskOutcome::Retrying),
                            failed = report.count(TaskOutcome::Failed),
                            "Scheduler poll finished"
                        ),
                        Ok(_) => {}
                        Err(e) => {
                            metrics::poll_errors_total();
                            tracing::error!("Scheduler poll failed: {}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Scheduler worker stopped");
    }
}
