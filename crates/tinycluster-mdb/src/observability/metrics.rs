//! Prometheus Metrics
//!
//! Metrics tracked:
//! - `tinycluster_store_txn_total` - counter of store transactions by op and outcome
//! - `tinycluster_update_conflicts_total` - counter of guarded updates that lost a race
//! - `tinycluster_store_dial_duration_seconds` - histogram of client dial times by outcome
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// State containing the Prometheus handle for metrics export
#[derive(Clone)]
pub struct MetricsState {
    pub prometheus_handle: PrometheusHandle,
}

impl MetricsState {
    /// Current metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Install the Prometheus recorder and register metric descriptions.
pub fn init_metrics() -> Result<MetricsState, Box<dyn std::error::Error + Send + Sync>> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_metric_descriptions();

    Ok(MetricsState {
        prometheus_handle: handle,
    })
}

fn register_metric_descriptions() {
    describe_counter!(
        "tinycluster_store_txn_total",
        "Total number of store transactions by operation and outcome"
    );
    describe_counter!(
        "tinycluster_update_conflicts_total",
        "Total number of machine updates that hit a concurrent write"
    );
    describe_histogram!(
        "tinycluster_store_dial_duration_seconds",
        "Duration of store client dials in seconds"
    );
}

/// Record a store transaction. `outcome` is one of `succeeded`,
/// `guard_failed` or `error`.
pub fn record_txn(op: &'static str, outcome: &'static str) {
    counter!("tinycluster_store_txn_total", "op" => op, "outcome" => outcome).increment(1);
}

pub fn record_update_conflict() {
    counter!("tinycluster_update_conflicts_total").increment(1);
}

/// Record how long opening a store client took
pub fn record_dial(duration: Duration, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    histogram!("tinycluster_store_dial_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_recording() {
        // Recording without an installed recorder must not panic
        record_txn("create", "succeeded");
        record_txn("update", "guard_failed");
        record_update_conflict();
        record_dial(Duration::from_millis(12), true);
        record_dial(Duration::from_secs(30), false);
    }
}
