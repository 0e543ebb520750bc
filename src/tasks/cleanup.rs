//! Expiry Purge Task
//!
//! Background task that periodically removes expired cache entries.
//! Reads already ignore expired entries; this only reclaims storage.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;

/// Spawns a background task that purges expired cache entries every
/// `cleanup_interval_secs` seconds.
///
/// The returned handle is aborted during graceful shutdown.
pub fn spawn_cleanup_task(cache: Arc<CacheStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    // A zero period would make tokio's interval panic
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "Starting cache purge task"
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let cache = Arc::clone(&cache);
            let removed = match tokio::task::spawn_blocking(move || cache.purge_expired()).await {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(error = %err, "Cache purge task failed");
                    continue;
                }
            };
            if removed > 0 {
                info!(removed, "Cache purge: removed expired entries");
            } else {
                debug!("Cache purge: no expired entries found");
            }
        }
    })
}
