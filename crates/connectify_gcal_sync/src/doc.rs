// File: crates/connectify_gcal_sync/src/doc.rs

#![cfg(feature = "openapi")]
use utoipa::OpenApi;

use crate::credentials::ConnectionStatus;
use crate::handlers::{
    AuthorizationUrlResponse, CountResponse, EnqueueRequest, ImportRequest, QueueListResponse,
};
use crate::import::{ImportReport, ImportStatus, ImportedEvent, ServiceMapping};
use crate::service::{BookingFailure, EnqueueResult, QueueStats, SyncAllReport};
use crate::worker::BatchSummary;
use connectify_common::models::{
    CredentialStatus, QueueStatusCounts, SyncAction, SyncQueueItem, SyncStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::start_authorization_handler,
        crate::handlers::oauth_callback_handler,
        crate::handlers::connection_status_handler,
        crate::handlers::disconnect_handler,
        crate::handlers::sync_all_handler,
        crate::handlers::import_handler,
        crate::handlers::enqueue_handler,
        crate::handlers::run_batch_handler,
        crate::handlers::reap_handler,
        crate::handlers::purge_completed_handler,
        crate::handlers::list_queue_handler,
        crate::handlers::queue_stats_handler
    ),
    components(
        schemas(
            AuthorizationUrlResponse,
            ConnectionStatus,
            CredentialStatus,
            EnqueueRequest,
            EnqueueResult,
            SyncAction,
            SyncStatus,
            SyncQueueItem,
            QueueListResponse,
            QueueStatusCounts,
            QueueStats,
            BatchSummary,
            CountResponse,
            SyncAllReport,
            BookingFailure,
            ImportRequest,
            ImportReport,
            ImportedEvent,
            ImportStatus,
            ServiceMapping
        )
    ),
    tags(
        (name = "GCal Sync", description = "Google Calendar synchronization of bookings")
    ),
    servers(
        (url = "/api", description = "Connectify API server")
    )
)]
pub struct GcalSyncApiDoc;
