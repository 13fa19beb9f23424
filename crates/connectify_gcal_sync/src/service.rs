//! Calendar sync service.
//!
//! Wires the credential manager, payload builder, reconciler, queue and worker together and
//! exposes the operations used by the HTTP handlers, the background loop and the worker CLI.

use crate::credentials::{CredentialManager, CredentialSettings};
use crate::error::{CredentialError, SyncError};
use crate::import::{self, ImportOptions, ImportReport, ImportStatus, ImportedEvent};
use crate::payload;
use crate::provider::GoogleCalendarProvider;
use crate::reconciler::{EventReconciler, ReconcileAction};
use crate::timezone;
use crate::worker::{BatchSummary, QueueWorker, WorkerSettings};
use chrono::{DateTime, Days, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use connectify_common::models::{NewBooking, QueueStatusCounts, SyncAction, SyncQueueItem};
use connectify_common::{CalendarProvider, RemoteEvent, RemoteEventTime};
use connectify_config::AppConfig;
use connectify_db::{
    BookingRepository, CredentialRepository, DbClient, DbError, SqlBookingRepository,
    SqlCredentialRepository, SqlSyncQueueRepository, SyncQueueRepository,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of offering a booking change to the queue.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResult {
    pub queued: bool,
    /// `true` if an existing pending or processing item absorbed the change.
    pub superseded: bool,
    pub item: Option<SyncQueueItem>,
    /// Why the change was not queued.
    pub skipped_reason: Option<String>,
}

/// Per-booking failure of a sync-all run.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct BookingFailure {
    pub booking_id: i64,
    pub error: String,
}

/// Outcome of synchronising all future bookings of a specialist.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncAllReport {
    pub specialist_id: i64,
    pub total: u32,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub failures: Vec<BookingFailure>,
}

/// Queue counts plus the number of connected specialists.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    #[serde(flatten)]
    pub counts: QueueStatusCounts,
    pub total: i64,
    pub connected_specialists: i64,
}

/// Calendar sync service
pub struct GcalSyncService {
    provider: Arc<dyn CalendarProvider>,
    credentials: Arc<CredentialManager>,
    reconciler: Arc<EventReconciler>,
    queue: SqlSyncQueueRepository,
    bookings: SqlBookingRepository,
    credential_repo: SqlCredentialRepository,
    worker: QueueWorker,
    sync_all_limit: u32,
}

impl GcalSyncService {
    /// Build the service on top of a database client and a calendar provider.
    pub fn new(
        db_client: DbClient,
        provider: Arc<dyn CalendarProvider>,
        credential_settings: CredentialSettings,
        worker_settings: WorkerSettings,
        sync_all_limit: u32,
    ) -> Self {
        let credential_repo = SqlCredentialRepository::new(db_client.clone());
        let queue = SqlSyncQueueRepository::new(db_client.clone());
        let bookings = SqlBookingRepository::new(db_client);

        let credentials = Arc::new(CredentialManager::new(
            credential_repo.clone(),
            provider.clone(),
            credential_settings,
        ));
        let reconciler = Arc::new(EventReconciler::new(bookings.clone(), provider.clone()));
        let worker = QueueWorker::new(
            queue.clone(),
            bookings.clone(),
            credentials.clone(),
            reconciler.clone(),
            worker_settings,
        );

        Self {
            provider,
            credentials,
            reconciler,
            queue,
            bookings,
            credential_repo,
            worker,
            sync_all_limit,
        }
    }

    /// Build the service with the Google provider from the application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Provider`] if the `gcal` section is missing or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &AppConfig, db_client: DbClient) -> Result<Self, CredentialError> {
        let gcal = config.gcal.as_ref().ok_or_else(|| {
            CredentialError::Provider(connectify_common::ProviderError::provider(
                "Google Calendar configuration (gcal) is missing",
            ))
        })?;
        let provider = Arc::new(GoogleCalendarProvider::new(gcal)?);

        Ok(Self::new(
            db_client,
            provider,
            CredentialSettings::from_config(gcal, &config.worker),
            WorkerSettings::from_config(gcal, &config.worker),
            config.worker.sync_all_limit,
        ))
    }

    /// Create the credential, queue and booking tables.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        self.credential_repo.init_schema().await?;
        self.queue.init_schema().await?;
        self.bookings.init_schema().await?;
        Ok(())
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn worker(&self) -> &QueueWorker {
        &self.worker
    }

    pub fn bookings(&self) -> &SqlBookingRepository {
        &self.bookings
    }

    /// Queue a booking change if the specialist has an active calendar connection.
    pub async fn enqueue_booking_change(
        &self,
        booking_id: i64,
        specialist_id: i64,
        action: SyncAction,
    ) -> Result<EnqueueResult, SyncError> {
        if !self.credentials.is_connected(specialist_id).await? {
            debug!(
                "Specialist {} is not connected, not queueing booking {}",
                specialist_id, booking_id
            );
            return Ok(EnqueueResult {
                queued: false,
                superseded: false,
                item: None,
                skipped_reason: Some(format!(
                    "specialist {} has no active calendar connection",
                    specialist_id
                )),
            });
        }

        let outcome = self
            .queue
            .enqueue(booking_id, specialist_id, action, Utc::now())
            .await?;
        info!(
            "Queued {} for booking {} (item {}{})",
            action,
            booking_id,
            outcome.item.id,
            if outcome.superseded { ", superseded" } else { "" }
        );
        Ok(EnqueueResult {
            queued: true,
            superseded: outcome.superseded,
            item: Some(outcome.item),
            skipped_reason: None,
        })
    }

    /// Synchronously mirror every upcoming, non-cancelled booking of a specialist.
    ///
    /// Uses the same reconciler as the queue worker, so bookings that already have a remote
    /// event are updated rather than created again. Failures of single bookings are collected
    /// in the report; a missing or revoked connection fails the whole call.
    pub async fn sync_all_for_specialist(
        &self,
        specialist_id: i64,
    ) -> Result<SyncAllReport, SyncError> {
        // Fail fast when the specialist cannot be synced at all
        self.credentials.get_valid_access_token(specialist_id).await?;

        let zone = self.worker.settings().default_zone;
        let now_local = Utc::now().with_timezone(&zone).naive_local();
        let bookings = self
            .bookings
            .find_upcoming_for_specialist(specialist_id, now_local, self.sync_all_limit)
            .await?;

        let mut report = SyncAllReport {
            specialist_id,
            ..Default::default()
        };
        for booking in bookings {
            report.total += 1;
            let result = async {
                let token = self.credentials.get_valid_access_token(specialist_id).await?;
                let event = payload::build_with_default(
                    &booking,
                    booking.service_name.as_deref(),
                    booking.workpoint_country.as_deref(),
                    zone,
                )?;
                let outcome = self
                    .reconciler
                    .create_or_update(booking.id, &token, &event)
                    .await?;
                Ok::<_, SyncError>(outcome.action)
            }
            .await;

            match result {
                Ok(ReconcileAction::Created) => report.created += 1,
                Ok(ReconcileAction::Updated) => report.updated += 1,
                Err(err) => {
                    warn!("Sync of booking {} failed: {}", booking.id, err);
                    report.failed += 1;
                    report.failures.push(BookingFailure {
                        booking_id: booking.id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            "Synced specialist {}: total={}, created={}, updated={}, failed={}",
            specialist_id, report.total, report.created, report.updated, report.failed
        );
        Ok(report)
    }

    /// Create bookings from the timed events of a specialist's calendar between `from` and
    /// `to`, both days included.
    ///
    /// Events already represented by a booking, all-day events and events without a positive
    /// duration are skipped. In preview mode nothing is written. Imported bookings keep the
    /// remote event id, so later syncs update the same event.
    pub async fn import_from_calendar(
        &self,
        specialist_id: i64,
        options: &ImportOptions,
    ) -> Result<ImportReport, SyncError> {
        let token = self.credentials.get_valid_access_token(specialist_id).await?;
        let zone = timezone::resolve(
            options.workpoint_country.as_deref(),
            self.worker.settings().default_zone,
        );
        let day_after = options.to.checked_add_days(Days::new(1)).unwrap_or(options.to);
        let time_min = local_to_utc(zone, options.from.and_time(NaiveTime::MIN));
        let time_max = local_to_utc(zone, day_after.and_time(NaiveTime::MIN));

        let events = self
            .provider
            .list_events(
                &token.token,
                &token.calendar_id,
                time_min,
                time_max,
                import::MAX_IMPORT_EVENTS,
            )
            .await?;
        info!(
            "Importing {} remote events for specialist {} ({} to {}{})",
            events.len(),
            specialist_id,
            options.from,
            options.to,
            if options.preview_only { ", preview" } else { "" }
        );

        let mut report = ImportReport {
            specialist_id,
            preview: options.preview_only,
            ..Default::default()
        };
        for event in &events {
            let outcome = self.import_event(specialist_id, event, zone, options).await;
            report.record(outcome);
        }

        info!(
            "Import for specialist {}: imported={}, skipped={}, failed={}",
            specialist_id, report.imported, report.skipped, report.failed
        );
        Ok(report)
    }

    async fn import_event(
        &self,
        specialist_id: i64,
        event: &RemoteEvent,
        zone: Tz,
        options: &ImportOptions,
    ) -> ImportedEvent {
        let mut outcome = ImportedEvent::new(event);
        let (start, end) = match (event.start, event.end) {
            (RemoteEventTime::At(start), RemoteEventTime::At(end)) => (start, end),
            _ => {
                outcome.all_day = true;
                return outcome.skip("all-day event");
            }
        };
        let start_local = start.with_timezone(&zone).naive_local();
        let end_local = end.with_timezone(&zone).naive_local();
        outcome.start_local = Some(start_local);
        outcome.end_local = Some(end_local);
        if end <= start {
            return outcome.skip("event ends at or before it starts");
        }

        let fields = import::extract_fields(
            event,
            &options.service_mappings,
            options.default_service.as_deref(),
        );
        outcome.client_name = Some(fields.client_name.clone());
        outcome.client_phone = Some(fields.client_phone.clone());
        outcome.service_name = fields.service_name.clone();

        match self
            .bookings
            .find_duplicate(specialist_id, &event.id, start_local, &fields.client_name)
            .await
        {
            Ok(Some(existing)) => {
                outcome.booking_id = Some(existing.id);
                return outcome.skip("already exists in database");
            }
            Ok(None) => {}
            Err(err) => return failed(outcome, err),
        }

        if options.preview_only {
            outcome.status = ImportStatus::WillImport;
            return outcome;
        }

        let booking = NewBooking {
            specialist_id,
            service_name: fields.service_name,
            client_name: Some(fields.client_name),
            client_phone: Some(fields.client_phone),
            start_local,
            end_local,
            workpoint_country: options.workpoint_country.clone(),
            workpoint_address: options.workpoint_address.clone(),
            created_on: Some(Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            received_through: Some(import::IMPORT_CHANNEL.to_string()),
            remote_event_id: Some(event.id.clone()),
        };
        match self.bookings.insert(&booking).await {
            Ok(inserted) => {
                debug!("Imported remote event {} as booking {}", event.id, inserted.id);
                outcome.status = ImportStatus::Imported;
                outcome.booking_id = Some(inserted.id);
                outcome
            }
            Err(err) => failed(outcome, err),
        }
    }

    pub async fn run_batch(&self, max_items: u32) -> Result<BatchSummary, SyncError> {
        self.worker.run_batch(max_items).await
    }

    pub async fn run_batch_for(
        &self,
        max_items: u32,
        specialist_id: Option<i64>,
    ) -> Result<BatchSummary, SyncError> {
        self.worker.run_batch_for(max_items, specialist_id).await
    }

    pub async fn reap_stale(&self) -> Result<u64, SyncError> {
        self.worker.reap_stale().await
    }

    pub async fn purge_completed(&self, older_than: Duration) -> Result<u64, SyncError> {
        self.worker.purge_completed(older_than).await
    }

    pub async fn recent_items(&self, limit: u32) -> Result<Vec<SyncQueueItem>, SyncError> {
        Ok(self.queue.list_recent(limit).await?)
    }

    pub async fn stats(&self) -> Result<QueueStats, SyncError> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let counts = self.queue.count_by_status(today_start).await?;
        let connected_specialists = self.credentials.connected_count().await?;
        Ok(QueueStats {
            total: counts.total(),
            counts,
            connected_specialists,
        })
    }
}

fn failed(mut outcome: ImportedEvent, err: DbError) -> ImportedEvent {
    warn!("Import of remote event {} failed: {}", outcome.event_id, err);
    outcome.status = ImportStatus::Failed;
    outcome.reason = Some(err.to_string());
    outcome
}

/// Earliest instant of a local wall-clock time, read as UTC when the zone skips it.
fn local_to_utc(zone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    zone.from_local_datetime(&local)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| local.and_utc())
}
