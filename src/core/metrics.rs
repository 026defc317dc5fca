use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

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
    metrics::describe_counter!(
        "generation_requests_total",
        "Variant generation requests by mode and result"
    );
    metrics::describe_counter!("attempts_started_total", "Attempts created (resumes excluded)");
    metrics::describe_counter!("answers_saved_total", "Answer upserts by result");
    metrics::describe_counter!("attempts_submitted_total", "Submitted attempts by trigger");
    metrics::describe_counter!("attempts_graded_total", "Graded attempts by terminal status");
    metrics::describe_counter!(
        "integrity_violations_total",
        "Tab-switch reports by escalation action"
    );
    metrics::describe_counter!(
        "expired_attempts_closed_total",
        "Attempts force-submitted by the expiry sweep"
    );
    metrics::describe_counter!("expiry_sweep_failures_total", "Expired attempts the sweep failed");
    metrics::describe_counter!(
        "progress_notifications_failed_total",
        "Progress events that could not be published"
    );
    metrics::describe_histogram!("grading_duration_seconds", "Attempt grading latency");
}
