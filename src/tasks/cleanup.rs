//! Cache Cleanup Task
//!
//! Background task that periodically reclaims expired cache entries, bounding
//! memory held by keys that are never read again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::SharedCache;

/// Spawns a task that sweeps expired entries every `interval`.
///
/// The task only holds a weak reference to the cache and exits on its own
/// once every strong handle is gone. The returned handle can also be aborted.
///
/// Must be called from within a tokio runtime. `interval` must be non-zero.
///
/// # Example
/// ```ignore
/// let cache = CacheStore::shared(Duration::from_secs(60));
/// let handle = spawn_cleanup_task(&cache, Duration::from_secs(24 * 60 * 60));
/// // Later:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: &SharedCache, interval: Duration) -> JoinHandle<()> {
    let cache = Arc::downgrade(cache);

    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Starting cache cleanup task");

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, stopping cleanup task");
                break;
            };

            let removed = {
                let mut cache_guard = cache.write().await;
                cache_guard.cleanup_expired()
            };

            if removed > 0 {
                info!(removed, "Cache cleanup: removed expired entries");
            } else {
                debug!("Cache cleanup: no expired entries found");
            }
        }
    })
}
