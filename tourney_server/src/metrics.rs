//! Prometheus metrics for the deferred-task worker.
//!
//! Without an installed exporter every recording call is a no-op, so the
//! worker records unconditionally.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use tourney_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::tasks_pending(3);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tourney::scheduler::{RunReport, TaskOutcome};

/// Initialize the Prometheus exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

fn outcome_label(outcome: &TaskOutcome) -> &'static str {
    match outcome {
        TaskOutcome::Completed => "completed",
        TaskOutcome::Retrying => "retrying",
        TaskOutcome::Failed => "failed",
        TaskOutcome::Superseded => "superseded",
    }
}

// ============================================================================
// Task Metrics
// ============================================================================

/// Increment the claimed-tasks counter.
pub fn tasks_claimed_total(count: usize) {
    metrics::counter!("scheduler_tasks_claimed_total").increment(count as u64);
}

/// Record one finished task run.
pub fn task_runs_total(action: &str, outcome: &TaskOutcome) {
    metrics::counter!("scheduler_task_runs_total",
        "action" => action.to_string(),
        "outcome" => outcome_label(outcome)
    )
    .increment(1);
}

/// Record task duration in milliseconds.
pub fn task_duration_ms(action: &str, duration_ms: f64) {
    metrics::histogram!("scheduler_task_duration_ms",
        "action" => action.to_string()
    )
    .record(duration_ms);
}

/// Set the number of tasks waiting to run.
pub fn tasks_pending(count: i64) {
    metrics::gauge!("scheduler_tasks_pending").set(count as f64);
}

/// Increment the poll error counter.
pub fn poll_errors_total() {
    metrics::counter!("scheduler_poll_errors_total").increment(1);
}

/// Record every run of one poll.
pub fn record_report(report: &RunReport) {
    tasks_claimed_total(report.claimed());
    for run in &report.runs {
        task_runs_total(&run.action, &run.outcome);
        task_duration_ms(&run.action, run.elapsed.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tourney::scheduler::TaskRun;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        let report = RunReport {
            runs: vec![TaskRun {
                task_id: 1,
                action: "release_credentials".to_string(),
                outcome: TaskOutcome::Completed,
                elapsed: Duration::from_millis(12),
            }],
        };
        record_report(&report);
        tasks_pending(0);
        poll_errors_total();
    }

    #[test]
    fn test_outcome_labels_are_distinct() {
        let labels = [
            outcome_label(&TaskOutcome::Completed),
            outcome_label(&TaskOutcome::Retrying),
            outcome_label(&TaskOutcome::Failed),
            outcome_label(&TaskOutcome::Superseded),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
