//! Liveness monitor: reaps local sessions whose prompt stopped heartbeating.
//!
//! Sweeps all active local sessions on a fixed interval. Dead sessions are
//! killed, their directories removed, and their entries dropped from the
//! shared [`SessionStore`] so later asks report "not found".

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::exchange::store::SessionStore;
use crate::local::manager::LocalChannelManager;

/// Spawn the background sweep task.
///
/// The task sweeps every `interval` until the `CancellationToken` fires.
#[must_use]
pub fn spawn_liveness_monitor(
    local: LocalChannelManager,
    store: SessionStore,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("liveness monitor shutting down");
                    break;
                }
                () = tokio::time::sleep(interval) => {}
            }

            sweep_once(&local, &store).await;
        }
    })
}

/// Run one sweep and drop reaped sessions from the store.
///
/// Returns the reaped session ids.
pub async fn sweep_once(local: &LocalChannelManager, store: &SessionStore) -> Vec<String> {
    let reaped = local.sweep().await;
    for session_id in &reaped {
        if store.remove(session_id).await.is_some() {
            warn!(session_id, "local session reaped after missed heartbeats");
        }
    }
    reaped
}
