use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::manager::Inner;
use crate::errors::AvsError;

/// Keepalive for one session epoch.
///
/// Sleeps in `keepalive_tick` steps until the session has been idle for
/// `ping_interval`, then pings. A failed ping rebuilds the session, which spawns the
/// next keepalive task, and this one exits.
pub(super) async fn keepalive_loop(
    inner: Arc<Inner>,
    epoch: u64,
    cancel: CancellationToken,
    last_activity: Arc<Mutex<Instant>>,
) {
    debug!(epoch, "Keepalive started");

    loop {
        // Idle wait, cancellable at tick resolution
        loop {
            if cancel.is_cancelled() {
                debug!(epoch, "Keepalive stopped");
                return;
            }
            let idle = last_activity.lock().elapsed();
            if idle >= inner.ping_interval {
                break;
            }
            let wait = inner.keepalive_tick.min(inner.ping_interval - idle);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(epoch, "Keepalive stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if cancel.is_cancelled() {
            debug!(epoch, "Keepalive stopped");
            return;
        }

        match inner.ping(epoch).await {
            Ok(()) => debug!(epoch, "Ping acknowledged"),
            Err(AvsError::StaleSession { .. }) | Err(AvsError::NotConnected) => {
                // Someone else already replaced or dropped this session
                debug!(epoch, "Keepalive outlived its session");
                return;
            }
            Err(e) => {
                info!(epoch, error = %e, "Keepalive ping failed, reinitializing session");
                inner.record_keepalive_reconnect();
                match inner.initialize_session().await {
                    Ok(()) => info!(previous_epoch = epoch, "Session reinitialized after failed ping"),
                    Err(AvsError::Closed) => debug!("Manager closed during reinitialization"),
                    Err(e) => error!(error = %e, "Session reinitialization failed"),
                }
                return;
            }
        }
    }
}
