//! services/api/src/web/janitor.rs
//!
//! A background task that prunes expired usage windows so the table does not
//! grow with every client ever seen.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wiki_quiz_core::RateLimiter;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Spawns the janitor. It runs one pass every `every` (at least a second) until
/// `cancellation_token` fires.
pub fn spawn_janitor(
    limiter: Arc<RateLimiter>,
    every: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Usage-window janitor started.");
        let mut ticker = tokio::time::interval(every.max(MIN_PERIOD));
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Usage-window janitor cancelled.");
                    return;
                }
                _ = ticker.tick() => {
                    match limiter.prune_stale().await {
                        Ok(0) => {}
                        Ok(pruned) => info!(pruned, "Pruned expired usage windows."),
                        Err(e) => error!("Failed to prune usage windows: {}", e),
                    }
                }
            }
        }
    })
}
