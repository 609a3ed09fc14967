//! Maintenance Task
//!
//! Background task that periodically reaps expired local entries and lets the
//! remote tier do its own housekeeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::local::LocalCache;
use crate::remote::DistributedTier;

/// Spawns the maintenance loop.
///
/// Each tick removes expired entries from `local` and calls
/// [`DistributedTier::maintain`] on `remote`. The loop ends on its own once
/// the local tier is closed; abort the handle to stop it sooner.
///
/// # Example
/// ```ignore
/// let handle = spawn_maintenance_task(local.clone(), None, Duration::from_secs(60));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_maintenance_task(
    local: Arc<LocalCache>,
    remote: Option<Arc<dyn DistributedTier>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "Starting cache maintenance task"
        );

        loop {
            tokio::time::sleep(interval).await;

            if local.is_closed() {
                debug!("Local cache closed, stopping maintenance task");
                break;
            }

            let removed = local.cleanup_expired();
            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }

            if let Some(remote) = &remote {
                remote.maintain().await;
            }
        }
    })
}
