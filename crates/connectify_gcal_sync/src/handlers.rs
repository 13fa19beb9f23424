// --- File: crates/connectify_gcal_sync/src/handlers.rs ---
use crate::credentials::ConnectionStatus;
use crate::import::{ImportOptions, ImportReport, ServiceMapping};
use crate::service::{EnqueueResult, GcalSyncService, QueueStats, SyncAllReport};
use crate::worker::BatchSummary;
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{Days, Duration, NaiveDate, Utc};
use connectify_common::models::{SyncAction, SyncQueueItem};
use connectify_common::{map_json_error, validation_error, ConnectifyError};
use connectify_config::AppConfig;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[cfg(feature = "openapi")]
use utoipa::{IntoParams, ToSchema};

/// Default number of items returned by the queue listing.
const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 500;
/// Completed items older than this are purged when no age is given.
const DEFAULT_RETENTION_HOURS: i64 = 24 * 7;
const MAX_RETENTION_HOURS: i64 = 24 * 365 * 100;
/// Days imported when no end date is given.
const DEFAULT_IMPORT_DAYS: u64 = 30;
const MAX_IMPORT_DAYS: i64 = 366;

// Shared state of the calendar sync routes
#[derive(Clone)]
pub struct GcalSyncState {
    pub config: Arc<AppConfig>,
    pub service: Arc<GcalSyncService>,
}

#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[derive(Debug, Deserialize)]
pub struct StartAuthorizationQuery {
    pub specialist_id: i64,
}

#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[derive(Debug, Serialize)]
pub struct AuthorizationUrlResponse {
    pub specialist_id: i64,
    pub authorization_url: String,
}

#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declined consent.
    pub error: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub booking_id: i64,
    pub specialist_id: i64,
    pub action: SyncAction,
}

/// Date range and defaults for importing remote events. Dates are local to the workpoint.
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Defaults to today.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub from_date: Option<NaiveDate>,
    /// Inclusive; defaults to 30 days after `from_date`.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub service_mappings: Vec<ServiceMapping>,
    pub default_service: Option<String>,
    pub workpoint_country: Option<String>,
    pub workpoint_address: Option<String>,
    #[serde(default)]
    pub preview_only: bool,
}

impl ImportRequest {
    fn into_options(self) -> Result<ImportOptions, ConnectifyError> {
        let from = self.from_date.unwrap_or_else(|| Utc::now().date_naive());
        let to = match self.to_date {
            Some(to) => to,
            None => from
                .checked_add_days(Days::new(DEFAULT_IMPORT_DAYS))
                .ok_or_else(|| validation_error("from_date is out of range"))?,
        };
        let days = (to - from).num_days();
        if days < 0 {
            return Err(validation_error("to_date must not be before from_date"));
        }
        if days > MAX_IMPORT_DAYS {
            return Err(validation_error(format!(
                "Import range must not exceed {} days",
                MAX_IMPORT_DAYS
            )));
        }
        Ok(ImportOptions {
            from,
            to,
            service_mappings: self.service_mappings,
            default_service: self.default_service,
            workpoint_country: self.workpoint_country,
            workpoint_address: self.workpoint_address,
            preview_only: self.preview_only,
        })
    }
}

#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[derive(Debug, Deserialize)]
pub struct RunBatchQuery {
    pub max_items: Option<u32>,
    pub specialist_id: Option<i64>,
}

#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[derive(Debug, Deserialize)]
pub struct PurgeQuery {
    pub older_than_hours: Option<i64>,
}

#[cfg_attr(feature = "openapi", derive(IntoParams))]
#[derive(Debug, Deserialize)]
pub struct ListQueueQuery {
    pub limit: Option<u32>,
}

#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub items: Vec<SyncQueueItem>,
}

#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub affected: u64,
}

/// Start connecting a specialist's calendar and return the consent URL.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/gcal-sync/oauth/start",
    params(StartAuthorizationQuery),
    responses(
        (status = 200, description = "Consent URL to send the specialist to", body = AuthorizationUrlResponse),
        (status = 500, description = "Storage or configuration error")
    ),
    tag = "GCal Sync"
))]
pub async fn start_authorization_handler(
    State(state): State<Arc<GcalSyncState>>,
    Query(query): Query<StartAuthorizationQuery>,
) -> Result<Json<AuthorizationUrlResponse>, ConnectifyError> {
    let authorization_url = state
        .service
        .credentials()
        .begin_authorization(query.specialist_id)
        .await?;
    Ok(Json(AuthorizationUrlResponse {
        specialist_id: query.specialist_id,
        authorization_url,
    }))
}

/// OAuth redirect target. The returned state identifies the specialist.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/gcal-sync/oauth/callback",
    params(OAuthCallbackQuery),
    responses(
        (status = 200, description = "Calendar connected", body = ConnectionStatus),
        (status = 400, description = "Consent declined, missing parameters or state mismatch"),
        (status = 401, description = "Authorization code rejected"),
        (status = 502, description = "Provider unavailable")
    ),
    tag = "GCal Sync"
))]
pub async fn oauth_callback_handler(
    State(state): State<Arc<GcalSyncState>>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Json<ConnectionStatus>, ConnectifyError> {
    if let Some(error) = query.error {
        info!("OAuth callback reported an error: {}", error);
        return Err(crate::error::CredentialError::AuthorizationDenied(error).into());
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| validation_error("Missing authorization code"))?;
    let returned_state = query
        .state
        .filter(|s| !s.is_empty())
        .ok_or_else(|| validation_error("Missing state parameter"))?;

    let credentials = state.service.credentials();
    let credential = credentials
        .complete_authorization_by_state(&returned_state, &code)
        .await?;
    let status = credentials.status(credential.specialist_id).await?;
    Ok(Json(status))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/gcal-sync/specialists/{specialist_id}/status",
    params(("specialist_id" = i64, Path, description = "Specialist id")),
    responses(
        (status = 200, description = "Connection status", body = ConnectionStatus)
    ),
    tag = "GCal Sync"
))]
pub async fn connection_status_handler(
    State(state): State<Arc<GcalSyncState>>,
    Path(specialist_id): Path<i64>,
) -> Result<Json<ConnectionStatus>, ConnectifyError> {
    let status = state.service.credentials().status(specialist_id).await?;
    Ok(Json(status))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/specialists/{specialist_id}/disconnect",
    params(("specialist_id" = i64, Path, description = "Specialist id")),
    responses(
        (status = 200, description = "Calendar disconnected", body = ConnectionStatus)
    ),
    tag = "GCal Sync"
))]
pub async fn disconnect_handler(
    State(state): State<Arc<GcalSyncState>>,
    Path(specialist_id): Path<i64>,
) -> Result<Json<ConnectionStatus>, ConnectifyError> {
    let credentials = state.service.credentials();
    credentials.disconnect(specialist_id).await?;
    Ok(Json(credentials.status(specialist_id).await?))
}

/// Mirror all upcoming bookings of a specialist right away.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/specialists/{specialist_id}/sync-all",
    params(("specialist_id" = i64, Path, description = "Specialist id")),
    responses(
        (status = 200, description = "Per-booking results", body = SyncAllReport),
        (status = 401, description = "Calendar access revoked"),
        (status = 409, description = "Specialist not connected")
    ),
    tag = "GCal Sync"
))]
pub async fn sync_all_handler(
    State(state): State<Arc<GcalSyncState>>,
    Path(specialist_id): Path<i64>,
) -> Result<Json<SyncAllReport>, ConnectifyError> {
    info!("Manual sync of all bookings for specialist {}", specialist_id);
    let report = state.service.sync_all_for_specialist(specialist_id).await?;
    Ok(Json(report))
}

/// Create bookings from the events already in a specialist's calendar.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/specialists/{specialist_id}/import",
    params(("specialist_id" = i64, Path, description = "Specialist id")),
    request_body = ImportRequest,
    responses(
        (status = 200, description = "Per-event results", body = ImportReport),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Calendar access revoked"),
        (status = 409, description = "Specialist not connected"),
        (status = 502, description = "Provider unavailable")
    ),
    tag = "GCal Sync"
))]
pub async fn import_handler(
    State(state): State<Arc<GcalSyncState>>,
    Path(specialist_id): Path<i64>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportReport>, ConnectifyError> {
    let options = request.into_options()?;
    info!(
        "Import of calendar events for specialist {} ({} to {})",
        specialist_id, options.from, options.to
    );
    let report = state
        .service
        .import_from_calendar(specialist_id, &options)
        .await?;
    Ok(Json(report))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/queue",
    request_body = EnqueueRequest,
    responses(
        (status = 200, description = "Queued, merged into an existing item, or skipped", body = EnqueueResult)
    ),
    tag = "GCal Sync"
))]
pub async fn enqueue_handler(
    State(state): State<Arc<GcalSyncState>>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResult>, ConnectifyError> {
    let result = state
        .service
        .enqueue_booking_change(request.booking_id, request.specialist_id, request.action)
        .await?;
    Ok(Json(result))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/queue/run",
    params(RunBatchQuery),
    responses(
        (status = 200, description = "Batch summary", body = BatchSummary)
    ),
    tag = "GCal Sync"
))]
pub async fn run_batch_handler(
    State(state): State<Arc<GcalSyncState>>,
    Query(query): Query<RunBatchQuery>,
) -> Result<Json<BatchSummary>, ConnectifyError> {
    let max_items = query
        .max_items
        .unwrap_or(state.config.worker.batch_size)
        .max(1);
    info!("Manual queue run (max_items={})", max_items);
    let summary = state
        .service
        .run_batch_for(max_items, query.specialist_id)
        .await?;
    Ok(Json(summary))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/gcal-sync/queue/reap",
    responses(
        (status = 200, description = "Number of stale items returned to pending", body = CountResponse)
    ),
    tag = "GCal Sync"
))]
pub async fn reap_handler(
    State(state): State<Arc<GcalSyncState>>,
) -> Result<Json<CountResponse>, ConnectifyError> {
    let affected = state.service.reap_stale().await?;
    Ok(Json(CountResponse { affected }))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/gcal-sync/queue/completed",
    params(PurgeQuery),
    responses(
        (status = 200, description = "Number of purged items", body = CountResponse),
        (status = 400, description = "Age out of range")
    ),
    tag = "GCal Sync"
))]
pub async fn purge_completed_handler(
    State(state): State<Arc<GcalSyncState>>,
    Query(query): Query<PurgeQuery>,
) -> Result<Json<CountResponse>, ConnectifyError> {
    let hours = query.older_than_hours.unwrap_or(DEFAULT_RETENTION_HOURS);
    if !(0..=MAX_RETENTION_HOURS).contains(&hours) {
        return Err(validation_error(format!(
            "older_than_hours must be between 0 and {}",
            MAX_RETENTION_HOURS
        )));
    }
    let affected = state
        .service
        .purge_completed(Duration::hours(hours))
        .await?;
    Ok(Json(CountResponse { affected }))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/gcal-sync/queue",
    params(ListQueueQuery),
    responses(
        (status = 200, description = "Most recently updated queue items", body = QueueListResponse)
    ),
    tag = "GCal Sync"
))]
pub async fn list_queue_handler(
    State(state): State<Arc<GcalSyncState>>,
    Query(query): Query<ListQueueQuery>,
) -> Result<Json<QueueListResponse>, ConnectifyError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let items = state.service.recent_items(limit).await?;
    Ok(Json(QueueListResponse { items }))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/gcal-sync/queue/stats",
    responses(
        (status = 200, description = "Counts per status and connected specialists", body = QueueStats)
    ),
    tag = "GCal Sync"
))]
pub async fn queue_stats_handler(
    State(state): State<Arc<GcalSyncState>>,
) -> Result<Json<QueueStats>, ConnectifyError> {
    map_json_error(state.service.stats().await, ConnectifyError::from)
}
