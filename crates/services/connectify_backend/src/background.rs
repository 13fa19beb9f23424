// --- File: crates/services/connectify_backend/src/background.rs ---
//! Periodic queue processing.
//!
//! Every tick first returns abandoned `processing` items to `pending` and then runs one
//! batch. Errors are logged and the loop keeps going until shutdown is signalled.

use connectify_gcal_sync::{BatchSummary, GcalSyncService, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// What one tick of the loop does.
#[derive(Debug, Clone, Copy)]
pub struct TickOptions {
    pub max_items: u32,
    pub specialist_id: Option<i64>,
    pub reap: bool,
}

/// Run one tick: optionally reap stale items, then process one batch.
pub async fn run_tick(
    service: &GcalSyncService,
    options: TickOptions,
) -> Result<BatchSummary, SyncError> {
    if options.reap {
        let reset = service.reap_stale().await?;
        if reset > 0 {
            info!("Returned {} stale queue item(s) to pending", reset);
        }
    }
    service
        .run_batch_for(options.max_items, options.specialist_id)
        .await
}

/// Tick every `poll_interval` until `shutdown` turns `true` or its sender is dropped.
pub async fn run_loop(
    service: Arc<GcalSyncService>,
    options: TickOptions,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        "Queue worker started (every {}s, max {} items)",
        poll_interval.as_secs(),
        options.max_items
    );
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_tick(&service, options).await {
                    Ok(summary) if summary.processed > 0 => debug!("Tick finished: {:?}", summary),
                    Ok(_) => {}
                    Err(err) => error!("Queue worker tick failed: {}", err),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!("Queue worker stopped");
}

/// Start [`run_loop`] on the runtime.
pub fn spawn(
    service: Arc<GcalSyncService>,
    options: TickOptions,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_loop(service, options, poll_interval, shutdown))
}
