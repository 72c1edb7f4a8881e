use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::codes::{unix_now, CodeLifecycleManager};
use crate::AppState;

/// Start the background task that prunes expired access codes.
///
/// Runs on its own interval, independent of the rotation period.
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = state.config.codes.prune_interval();
    let manager = CodeLifecycleManager::from_state(&state);
    let cancel = state.shutdown.child_token();

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval_at(Instant::now() + interval, interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Expiration cleaner stopped");
                    return;
                }
                _ = interval_timer.tick() => run_cleanup(&manager, unix_now()).await,
            }
        }
    })
}

async fn run_cleanup(manager: &CodeLifecycleManager, now: i64) {
    debug!("Running expiration cleanup");

    match manager.prune(now).await {
        Ok(count) if count > 0 => info!(codes_cleaned = count, "Expired access codes cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired access codes"),
        _ => {}
    }
}
