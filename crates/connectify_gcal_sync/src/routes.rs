// --- File: crates/connectify_gcal_sync/src/routes.rs ---

use crate::handlers::{
    connection_status_handler, disconnect_handler, enqueue_handler, import_handler,
    list_queue_handler, oauth_callback_handler, purge_completed_handler, queue_stats_handler,
    reap_handler, run_batch_handler, start_authorization_handler, sync_all_handler,
    GcalSyncState,
};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Creates a router containing all calendar sync routes, relative to `/api`.
pub fn routes(state: Arc<GcalSyncState>) -> Router {
    Router::new()
        .route("/gcal-sync/oauth/start", get(start_authorization_handler))
        .route("/gcal-sync/oauth/callback", get(oauth_callback_handler))
        .route(
            "/gcal-sync/specialists/{specialist_id}/status",
            get(connection_status_handler),
        )
        .route(
            "/gcal-sync/specialists/{specialist_id}/disconnect",
            post(disconnect_handler),
        )
        .route(
            "/gcal-sync/specialists/{specialist_id}/sync-all",
            post(sync_all_handler),
        )
        .route(
            "/gcal-sync/specialists/{specialist_id}/import",
            post(import_handler),
        )
        .route(
            "/gcal-sync/queue",
            get(list_queue_handler).post(enqueue_handler),
        )
        .route("/gcal-sync/queue/run", post(run_batch_handler))
        .route("/gcal-sync/queue/reap", post(reap_handler))
        .route("/gcal-sync/queue/completed", delete(purge_completed_handler))
        .route("/gcal-sync/queue/stats", get(queue_stats_handler))
        .with_state(state)
}
