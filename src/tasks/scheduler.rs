use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::expiry;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let every = Duration::from_secs(state.settings().attempts().sweep_interval_seconds);

    tracing::info!(interval_seconds = every.as_secs(), "Expiry sweeper starting");

    let handles = vec![
        tokio::spawn(expiry_loop(state.clone(), every, shutdown_rx.clone())),
        tokio::spawn(stalled_grading_loop(state.clone(), every, shutdown_rx)),
    ];

    crate::core::shutdown::broadcast_shutdown(shutdown_tx).await;

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn expiry_loop(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = expiry::sweep_expired_attempts(&state).await {
                    metrics::counter!("expiry_sweep_failures_total").increment(1);
                    tracing::error!(error = %format!("{err:#}"), "sweep_expired_attempts failed");
                }
            }
        }
    }
}

async fn stalled_grading_loop(state: AppState, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(every * 2);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = expiry::recover_stalled_grading(&state).await {
                    tracing::error!(error = %format!("{err:#}"), "recover_stalled_grading failed");
                }
            }
        }
    }
}
