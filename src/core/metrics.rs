use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder once per process when enabled. Later calls are no-ops.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    describe_counter!("grading_jobs_total", "Submissions processed by the poller, by outcome");
    describe_histogram!(
        "grading_duration_seconds",
        Unit::Seconds,
        "Time spent grading one claimed submission"
    );
    describe_counter!("grading_claims_total", "Per-submission claim attempts, by result");
    describe_counter!(
        "stale_submissions_reset_total",
        "Submissions returned from GRADING to INITIALIZED after the stale timeout"
    );
    describe_counter!(
        "evaluate_lock_rejections_total",
        "Synchronous evaluations rejected because one was already in progress"
    );
    describe_counter!(
        "lease_ownership_lost_total",
        "Leases that had expired or changed owner by the time they were released"
    );
    describe_counter!("download_cache_total", "Download cache lookups, by result");
    describe_counter!(
        "relay_malformed_events_total",
        "Grading stream records that could not be parsed"
    );
    describe_counter!("http_requests_total", "HTTP responses, by status");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency, by status"
    );
}
