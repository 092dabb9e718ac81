use tokio::time::{Duration, MissedTickBehavior, interval};

use crate::AppState;
use crate::jobs::fast_path::run_fast_path;
use crate::models::sync::StepStatus;

/// Run the fast path in-process every `every`, for deployments without an external scheduler.
pub async fn start_fast_path_job(state: AppState, every: Duration) {
    tokio::spawn(async move {
        let mut interval = interval(every);
        // A slow upstream must not cause a burst of catch-up runs.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Fast path job scheduled every {}s", every.as_secs());

        loop {
            interval.tick().await;

            tracing::info!("Starting scheduled fast path run");
            let report = run_fast_path(state.upstream.as_ref(), state.store.as_ref(), &state.fast_path).await;

            match report.status {
                StepStatus::Error => {
                    tracing::error!("Scheduled fast path failed: {}", report.stats.errors.join("; "))
                }
                StepStatus::Partial => tracing::warn!(
                    "Scheduled fast path completed with {} errors",
                    report.stats.errors.len()
                ),
                _ => tracing::debug!("Scheduled fast path completed in {:.2}s", report.duration),
            }
        }
    });
}
