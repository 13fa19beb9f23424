//! Repository for the durable sync queue
//!
//! A queue item records that one booking's remote event must be brought in line with the
//! booking store. At most one non-terminal item exists per booking: a newer change for a
//! booking supersedes the pending one instead of adding a second item.

use crate::error::DbError;
use chrono::{DateTime, Utc};

pub use connectify_common::models::{QueueStatusCounts, SyncAction, SyncQueueItem, SyncStatus};

/// Result of an enqueue call
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    /// The queue item now carrying the change
    pub item: SyncQueueItem,
    /// `true` if an existing non-terminal item absorbed the change
    pub superseded: bool,
}

/// Repository for the sync queue
pub trait SyncQueueRepository {
    /// Create the `gcal_sync_queue` table and its indexes if they do not exist yet
    fn init_schema(&self) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    /// Record a change for a booking
    ///
    /// A pending item for the same booking takes over the new action and becomes due
    /// immediately. A processing item is flagged so that it returns to `pending` once the
    /// current attempt finishes. Otherwise a new pending item is inserted.
    fn enqueue(
        &self,
        booking_id: i64,
        specialist_id: i64,
        action: SyncAction,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<EnqueueOutcome, DbError>> + Send;

    /// Find a queue item by id
    fn find_by_id(
        &self,
        id: i64,
    ) -> impl std::future::Future<Output = Result<Option<SyncQueueItem>, DbError>> + Send;

    /// Find the non-terminal item of a booking, if any
    fn find_active_for_booking(
        &self,
        booking_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<SyncQueueItem>, DbError>> + Send;

    /// Atomically move up to `limit` due pending items to `processing`
    ///
    /// Items are taken oldest first. An item is returned to exactly one caller, however many
    /// workers claim concurrently.
    fn claim_batch(
        &self,
        limit: u32,
        specialist_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<SyncQueueItem>, DbError>> + Send;

    /// Record a successful attempt
    ///
    /// # Returns
    ///
    /// The status the item ended in: `completed`, or `pending` if a newer change arrived
    /// during the attempt
    fn complete(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<SyncStatus, DbError>> + Send;

    /// Record a retryable failure
    ///
    /// The attempt counter is incremented. Once it reaches `max_attempts` the item fails,
    /// otherwise it returns to `pending` and is not claimable before `next_attempt_at`.
    fn retry_or_fail(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<SyncStatus, DbError>> + Send;

    /// Record a non-retryable failure
    ///
    /// The item fails unless a newer change arrived during the attempt, in which case it
    /// returns to `pending` carrying that change.
    fn fail(
        &self,
        id: i64,
        error: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<SyncStatus, DbError>> + Send;

    /// Return items stuck in `processing` since before `claimed_before` to `pending`
    ///
    /// # Returns
    ///
    /// The number of reaped items
    fn reset_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, DbError>> + Send;

    /// Most recently updated items, newest first
    fn list_recent(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<SyncQueueItem>, DbError>> + Send;

    /// Number of items per status, plus the number completed since `today_start`
    fn count_by_status(
        &self,
        today_start: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<QueueStatusCounts, DbError>> + Send;

    /// Delete completed items processed before `processed_before`
    fn purge_completed(
        &self,
        processed_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, DbError>> + Send;
}
