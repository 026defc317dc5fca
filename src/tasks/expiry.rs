use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::attempt_grading;
use crate::services::attempts::SubmitTrigger;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) found: usize,
    pub(crate) closed: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

/// Closes every in-progress attempt past its deadline, submitting it at the
/// deadline instant. Attempts closed concurrently by someone else are skipped;
/// a failure on one attempt does not stop the batch.
pub(crate) async fn sweep_expired_attempts(state: &AppState) -> Result<SweepReport> {
    let now = primitive_now_utc();
    let batch = i64::from(state.settings().attempts().sweep_batch_size);
    let expired = repositories::attempts::list_expired(state.db(), now, batch)
        .await
        .context("Failed to list expired attempts")?;

    let mut report = SweepReport { found: expired.len(), ..SweepReport::default() };
    for attempt in expired {
        match attempt_grading::finalize(state, &attempt.id, attempt.deadline_at, SubmitTrigger::Sweep)
            .await
        {
            Ok(Some(_)) => report.closed += 1,
            Ok(None) => report.skipped += 1,
            Err(err) => {
                report.failed += 1;
                metrics::counter!("expiry_sweep_failures_total").increment(1);
                tracing::error!(
                    error = %err,
                    attempt_id = %attempt.id,
                    assignment_id = %attempt.assignment_id,
                    "Failed to close expired attempt"
                );
            }
        }
    }

    if report.closed > 0 {
        metrics::counter!("expired_attempts_closed_total").increment(report.closed as u64);
    }
    if report.found > 0 {
        tracing::info!(
            found = report.found,
            closed = report.closed,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep finished"
        );
    }

    Ok(report)
}

/// Re-runs grading for attempts stuck in `submitted`.
pub(crate) async fn recover_stalled_grading(state: &AppState) -> Result<usize> {
    let settings = state.settings().attempts();
    let cutoff =
        primitive_now_utc() - Duration::seconds(settings.stalled_grading_after_seconds as i64);
    let stalled =
        repositories::attempts::list_stalled(state.db(), cutoff, i64::from(settings.sweep_batch_size))
            .await
            .context("Failed to list stalled attempts")?;

    let mut recovered = 0;
    for attempt in &stalled {
        match attempt_grading::grade_submitted(state, &attempt.id).await {
            Ok(Some(_)) => recovered += 1,
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    error = %format!("{err:#}"),
                    attempt_id = %attempt.id,
                    "Retrying grading failed"
                );
            }
        }
    }

    if !stalled.is_empty() {
        tracing::info!(stalled = stalled.len(), recovered, "Stalled grading recovery finished");
    }
    Ok(recovered)
}
