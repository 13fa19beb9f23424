//! Queue worker
//!
//! Drains the sync queue in batches. Each claimed item goes through credential, payload and
//! reconciler, under an overall time budget, and its outcome is written back to the queue.

use crate::credentials::CredentialManager;
use crate::error::{PayloadError, ReconcileError, SyncError};
use crate::payload;
use crate::reconciler::EventReconciler;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use connectify_common::models::{SyncAction, SyncQueueItem, SyncStatus};
use connectify_common::ProviderError;
use connectify_config::{GcalConfig, WorkerConfig};
use connectify_db::{
    BookingRepository, SqlBookingRepository, SqlSyncQueueRepository, SyncQueueRepository,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::timezone::DEFAULT_TIMEZONE;

/// Upper bound of the retry delay.
const MAX_BACKOFF_SECS: i64 = 3600;

/// Tunables of the queue worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub batch_size: u32,
    pub max_attempts: u32,
    pub item_timeout: std::time::Duration,
    pub stale_after: Duration,
    /// Delay before the first retry, doubled for every further attempt.
    pub retry_backoff: Duration,
    pub default_zone: Tz,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 5,
            item_timeout: std::time::Duration::from_secs(30),
            stale_after: Duration::seconds(900),
            retry_backoff: Duration::seconds(30),
            default_zone: DEFAULT_TIMEZONE,
        }
    }
}

impl WorkerSettings {
    pub fn from_config(gcal: &GcalConfig, worker: &WorkerConfig) -> Self {
        let default_zone = Tz::from_str(&gcal.default_timezone).unwrap_or_else(|_| {
            warn!(
                "Invalid default timezone '{}', using {}",
                gcal.default_timezone,
                DEFAULT_TIMEZONE.name()
            );
            DEFAULT_TIMEZONE
        });
        Self {
            batch_size: worker.batch_size,
            max_attempts: worker.max_attempts,
            item_timeout: std::time::Duration::from_secs(worker.item_timeout_secs),
            stale_after: Duration::seconds(worker.stale_after_secs),
            retry_backoff: Duration::seconds(worker.retry_backoff_secs),
            default_zone,
        }
    }

    /// Delay before the next attempt of an item that has failed `attempts` times so far.
    pub fn backoff_for(&self, attempts: i64) -> Duration {
        let factor = 1i64 << attempts.clamp(0, 16);
        let secs = self
            .retry_backoff
            .num_seconds()
            .saturating_mul(factor)
            .min(MAX_BACKOFF_SECS);
        Duration::seconds(secs)
    }
}

/// Aggregate outcome of one batch.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// Failed items that went back to `pending` for a later attempt.
    pub requeued: u32,
}

/// Queue worker
#[derive(Clone)]
pub struct QueueWorker {
    queue: SqlSyncQueueRepository,
    bookings: SqlBookingRepository,
    credentials: Arc<CredentialManager>,
    reconciler: Arc<EventReconciler>,
    settings: WorkerSettings,
}

impl QueueWorker {
    pub fn new(
        queue: SqlSyncQueueRepository,
        bookings: SqlBookingRepository,
        credentials: Arc<CredentialManager>,
        reconciler: Arc<EventReconciler>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            bookings,
            credentials,
            reconciler,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    /// Process up to `max_items` due items of any specialist.
    pub async fn run_batch(&self, max_items: u32) -> Result<BatchSummary, SyncError> {
        self.run_batch_for(max_items, None).await
    }

    /// Process up to `max_items` due items, optionally only those of one specialist.
    ///
    /// Only claiming can fail the batch as a whole. Failures of single items are recorded on
    /// the items and counted in the summary.
    pub async fn run_batch_for(
        &self,
        max_items: u32,
        specialist_id: Option<i64>,
    ) -> Result<BatchSummary, SyncError> {
        let items = self
            .queue
            .claim_batch(max_items, specialist_id, Utc::now())
            .await?;

        let mut summary = BatchSummary::default();
        if items.is_empty() {
            debug!("No due queue items");
            return Ok(summary);
        }

        info!("Processing {} queue item(s)", items.len());
        for item in &items {
            summary.processed += 1;
            let result = match tokio::time::timeout(self.settings.item_timeout, self.process(item)).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Reconcile(ReconcileError::Provider(
                    ProviderError::provider(format!(
                        "Timed out after {}s",
                        self.settings.item_timeout.as_secs()
                    )),
                ))),
            };
            self.record_outcome(item, result, &mut summary).await;
        }

        info!(
            "Batch done: processed={}, succeeded={}, failed={}, requeued={}",
            summary.processed, summary.succeeded, summary.failed, summary.requeued
        );
        Ok(summary)
    }

    /// Return items stuck in `processing` longer than the stale threshold to `pending`.
    pub async fn reap_stale(&self) -> Result<u64, SyncError> {
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(self.settings.stale_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self.queue.reset_stale(cutoff, now).await?)
    }

    /// Delete completed items processed more than `older_than` ago.
    ///
    /// An age reaching before the earliest representable instant purges nothing.
    pub async fn purge_completed(&self, older_than: Duration) -> Result<u64, SyncError> {
        let cutoff = Utc::now()
            .checked_sub_signed(older_than)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self.queue.purge_completed(cutoff).await?)
    }

    async fn process(&self, item: &SyncQueueItem) -> Result<(), SyncError> {
        debug!(
            "Queue item {}: {} booking {}",
            item.id, item.action, item.booking_id
        );

        let booking = self.bookings.find_by_id(item.booking_id).await?;
        let delete = item.action == SyncAction::Delete
            || booking.as_ref().is_some_and(|b| b.cancelled);

        if delete {
            if booking.as_ref().and_then(|b| b.remote_event_id.as_ref()).is_none() {
                debug!("Booking {} has no remote event to delete", item.booking_id);
                return Ok(());
            }
            let token = self
                .credentials
                .get_valid_access_token(item.specialist_id)
                .await?;
            self.reconciler.delete_remote(item.booking_id, &token).await?;
            return Ok(());
        }

        let booking = booking.ok_or(PayloadError::BookingNotFound(item.booking_id))?;
        let token = self
            .credentials
            .get_valid_access_token(item.specialist_id)
            .await?;
        let payload = payload::build_with_default(
            &booking,
            booking.service_name.as_deref(),
            booking.workpoint_country.as_deref(),
            self.settings.default_zone,
        )?;
        self.reconciler
            .create_or_update(item.booking_id, &token, &payload)
            .await?;
        Ok(())
    }

    async fn record_outcome(
        &self,
        item: &SyncQueueItem,
        result: Result<(), SyncError>,
        summary: &mut BatchSummary,
    ) {
        let now = Utc::now();
        let recorded = match result {
            Ok(()) => {
                summary.succeeded += 1;
                self.queue.complete(item.id, now).await
            }
            Err(err) => {
                summary.failed += 1;
                let message = err.to_string();
                let recorded = if err.is_retryable() {
                    let next_attempt_at: DateTime<Utc> =
                        now + self.settings.backoff_for(item.attempts);
                    warn!(
                        "Queue item {} (booking {}) failed, attempt {} of {}: {}",
                        item.id,
                        item.booking_id,
                        item.attempts + 1,
                        self.settings.max_attempts,
                        message
                    );
                    self.queue
                        .retry_or_fail(item.id, &message, self.settings.max_attempts, next_attempt_at, now)
                        .await
                } else {
                    error!(
                        "Queue item {} (booking {}) failed permanently: {}",
                        item.id, item.booking_id, message
                    );
                    self.queue.fail(item.id, &message, now).await
                };
                if matches!(recorded, Ok(SyncStatus::Pending)) {
                    summary.requeued += 1;
                }
                recorded
            }
        };

        match recorded {
            Ok(SyncStatus::Failed) => {
                info!("Queue item {} marked failed", item.id)
            }
            Ok(status) => debug!("Queue item {} is now {}", item.id, status),
            Err(err) => error!("Failed to record outcome of queue item {}: {}", item.id, err),
        }
    }
}
