//! SQL implementation of the sync queue repository

use crate::error::DbError;
use crate::repositories::sync_queue::{
    EnqueueOutcome, QueueStatusCounts, SyncAction, SyncQueueItem, SyncQueueRepository,
    SyncStatus,
};
use crate::repositories::{from_timestamp, from_timestamp_opt, to_timestamp};
use crate::DbClient;
use chrono::{DateTime, Utc};
use connectify_common::models::QueueEvent;
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::{debug, error, info, warn};

const QUEUE_COLUMNS: &str = "id, booking_id, specialist_id, action, status, attempts, last_error, \
     requeue, created_at, updated_at, claimed_at, processed_at, next_attempt_at";

/// SQL implementation of the sync queue repository
#[derive(Debug, Clone)]
pub struct SqlSyncQueueRepository {
    db_client: DbClient,
}

/// Target status of a transition, or an error if the state machine forbids it.
fn transition(from: SyncStatus, event: QueueEvent) -> Result<SyncStatus, DbError> {
    from.next(event).ok_or_else(|| {
        DbError::InvalidTransition(format!("{:?} is not allowed from {}", event, from))
    })
}

impl SqlSyncQueueRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    fn map_row(row: &AnyRow) -> Result<SyncQueueItem, DbError> {
        let decode = |e: sqlx::Error| DbError::DecodeError(e.to_string());

        let id: i64 = row.try_get("id").map_err(decode)?;
        let action_raw: String = row.try_get("action").map_err(decode)?;
        let action = action_raw
            .parse::<SyncAction>()
            .map_err(|e| DbError::DecodeError(format!("queue item {}: {}", id, e)))?;
        let status_raw: String = row.try_get("status").map_err(decode)?;
        let status = status_raw.parse::<SyncStatus>().unwrap_or_else(|err| {
            warn!("Queue item {} has {}; treating it as failed", id, err);
            SyncStatus::Failed
        });
        let requeue: i64 = row.try_get("requeue").unwrap_or_default();

        Ok(SyncQueueItem {
            id,
            booking_id: row.try_get("booking_id").map_err(decode)?,
            specialist_id: row.try_get("specialist_id").map_err(decode)?,
            action,
            status,
            attempts: row.try_get("attempts").unwrap_or_default(),
            last_error: row.try_get("last_error").unwrap_or_default(),
            requeue: requeue != 0,
            created_at: from_timestamp(row.try_get("created_at").unwrap_or_default()),
            updated_at: from_timestamp(row.try_get("updated_at").unwrap_or_default()),
            claimed_at: from_timestamp_opt(row.try_get("claimed_at").unwrap_or_default()),
            processed_at: from_timestamp_opt(row.try_get("processed_at").unwrap_or_default()),
            next_attempt_at: from_timestamp(row.try_get("next_attempt_at").unwrap_or_default()),
        })
    }

    /// Merge a change into the booking's non-terminal item, if there is one.
    async fn supersede(
        &self,
        booking_id: i64,
        specialist_id: i64,
        action: SyncAction,
        now: DateTime<Utc>,
    ) -> Result<Option<SyncQueueItem>, DbError> {
        let query = format!(
            r#"
            UPDATE gcal_sync_queue SET
                action = $1,
                specialist_id = $2,
                requeue = CASE WHEN status = $3 THEN 1 ELSE requeue END,
                attempts = CASE WHEN status = $4 THEN 0 ELSE attempts END,
                next_attempt_at = CASE WHEN status = $5 THEN $6 ELSE next_attempt_at END,
                updated_at = $7
            WHERE booking_id = $8 AND status IN ($9, $10)
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(action.as_str())
            .bind(specialist_id)
            .bind(SyncStatus::Processing.as_str())
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Pending.as_str())
            .bind(to_timestamp(now))
            .bind(to_timestamp(now))
            .bind(booking_id)
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Processing.as_str())
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to supersede queue item: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn insert(
        &self,
        booking_id: i64,
        specialist_id: i64,
        action: SyncAction,
        now: DateTime<Utc>,
    ) -> Result<SyncQueueItem, DbError> {
        let query = format!(
            r#"
            INSERT INTO gcal_sync_queue
                (booking_id, specialist_id, action, status, attempts, requeue, created_at, updated_at, next_attempt_at)
            VALUES ($1, $2, $3, $4, 0, 0, $5, $6, $7)
            RETURNING {}
            "#,
            QUEUE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(booking_id)
            .bind(specialist_id)
            .bind(action.as_str())
            .bind(SyncStatus::Pending.as_str())
            .bind(to_timestamp(now))
            .bind(to_timestamp(now))
            .bind(to_timestamp(now))
            .fetch_one(self.db_client.pool())
            .await
            .map_err(|e| {
                // Logged by the caller when it is not a lost race
                DbError::QueryError(e.to_string())
            })?;

        Self::map_row(&row)
    }

    async fn fetch_items(&self, query: &str, limit: Option<i64>) -> Result<Vec<SyncQueueItem>, DbError> {
        let mut q = sqlx::query(query);
        if let Some(limit) = limit {
            q = q.bind(limit);
        }
        let rows = q.fetch_all(self.db_client.pool()).await.map_err(|e| {
            error!("Failed to list queue items: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        rows.iter().map(Self::map_row).collect()
    }
}

impl SyncQueueRepository for SqlSyncQueueRepository {
    async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing sync queue schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS gcal_sync_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                booking_id INTEGER NOT NULL,
                specialist_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                requeue INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                claimed_at INTEGER,
                processed_at INTEGER,
                next_attempt_at INTEGER NOT NULL
            )
        "#;
        self.db_client.execute(query).await?;

        // At most one non-terminal item per booking
        self.db_client
            .execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS ux_gcal_sync_queue_active_booking \
                 ON gcal_sync_queue (booking_id) WHERE status IN ('pending', 'processing')",
            )
            .await?;
        self.db_client
            .execute(
                "CREATE INDEX IF NOT EXISTS ix_gcal_sync_queue_status_due \
                 ON gcal_sync_queue (status, next_attempt_at)",
            )
            .await?;

        info!("Sync queue schema initialized successfully");
        Ok(())
    }

    async fn enqueue(
        &self,
        booking_id: i64,
        specialist_id: i64,
        action: SyncAction,
        now: DateTime<Utc>,
    ) -> Result<EnqueueOutcome, DbError> {
        debug!("Enqueueing {} for booking {}", action, booking_id);

        if let Some(item) = self.supersede(booking_id, specialist_id, action, now).await? {
            debug!("Booking {} change merged into queue item {}", booking_id, item.id);
            return Ok(EnqueueOutcome {
                item,
                superseded: true,
            });
        }

        match self.insert(booking_id, specialist_id, action, now).await {
            Ok(item) => Ok(EnqueueOutcome {
                item,
                superseded: false,
            }),
            Err(err) if err.is_unique_violation() => {
                // Another producer inserted first; merge into its item instead
                let item = self
                    .supersede(booking_id, specialist_id, action, now)
                    .await?
                    .ok_or_else(|| {
                        DbError::QueryError(format!(
                            "queue item for booking {} vanished during enqueue",
                            booking_id
                        ))
                    })?;
                Ok(EnqueueOutcome {
                    item,
                    superseded: true,
                })
            }
            Err(err) => {
                error!("Failed to insert queue item: {}", err);
                Err(err)
            }
        }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SyncQueueItem>, DbError> {
        let query = format!("SELECT {} FROM gcal_sync_queue WHERE id = $1", QUEUE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find queue item: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_active_for_booking(&self, booking_id: i64) -> Result<Option<SyncQueueItem>, DbError> {
        let query = format!(
            "SELECT {} FROM gcal_sync_queue WHERE booking_id = $1 AND status IN ($2, $3)",
            QUEUE_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(booking_id)
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Processing.as_str())
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find active queue item: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn claim_batch(
        &self,
        limit: u32,
        specialist_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Vec<SyncQueueItem>, DbError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let claimed = transition(SyncStatus::Pending, QueueEvent::Claim)?;

        // A single statement, so concurrent claimers never receive the same item
        let specialist_filter = if specialist_id.is_some() {
            "AND specialist_id = $8"
        } else {
            ""
        };
        let query = format!(
            r#"
            UPDATE gcal_sync_queue SET status = $1, claimed_at = $2, updated_at = $3
            WHERE status = $4 AND id IN (
                SELECT id FROM gcal_sync_queue
                WHERE status = $5 AND next_attempt_at <= $6 {}
                ORDER BY created_at ASC, id ASC
                LIMIT $7
            )
            RETURNING {}
            "#,
            specialist_filter, QUEUE_COLUMNS
        );

        let mut q = sqlx::query(&query)
            .bind(claimed.as_str())
            .bind(to_timestamp(now))
            .bind(to_timestamp(now))
            .bind(SyncStatus::Pending.as_str())
            .bind(SyncStatus::Pending.as_str())
            .bind(to_timestamp(now))
            .bind(i64::from(limit));
        if let Some(specialist_id) = specialist_id {
            q = q.bind(specialist_id);
        }

        let rows = q.fetch_all(self.db_client.pool()).await.map_err(|e| {
            error!("Failed to claim queue items: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        let mut items = rows
            .iter()
            .map(Self::map_row)
            .collect::<Result<Vec<_>, _>>()?;
        items.sort_by_key(|item| (item.created_at, item.id));

        if !items.is_empty() {
            debug!("Claimed {} queue item(s)", items.len());
        }
        Ok(items)
    }

    async fn complete(&self, id: i64, now: DateTime<Utc>) -> Result<SyncStatus, DbError> {
        let completed = transition(SyncStatus::Processing, QueueEvent::Succeed)?;
        let requeued = transition(SyncStatus::Processing, QueueEvent::Retry)?;

        let row = sqlx::query(
            r#"
            UPDATE gcal_sync_queue SET
                status = CASE WHEN requeue = 1 THEN $1 ELSE $2 END,
                processed_at = CASE WHEN requeue = 1 THEN NULL ELSE $3 END,
                next_attempt_at = $4,
                last_error = NULL,
                attempts = 0,
                requeue = 0,
                claimed_at = NULL,
                updated_at = $5
            WHERE id = $6 AND status = $7
            RETURNING status
            "#,
        )
        .bind(requeued.as_str())
        .bind(completed.as_str())
        .bind(to_timestamp(now))
        .bind(to_timestamp(now))
        .bind(to_timestamp(now))
        .bind(id)
        .bind(SyncStatus::Processing.as_str())
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to complete queue item: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        final_status(id, row)
    }

    async fn retry_or_fail(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
        next_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SyncStatus, DbError> {
        let retried = transition(SyncStatus::Processing, QueueEvent::Retry)?;
        let failed = transition(SyncStatus::Processing, QueueEvent::Fail)?;

        let row = sqlx::query(
            r#"
            UPDATE gcal_sync_queue SET
                status = CASE
                    WHEN requeue = 1 THEN $1
                    WHEN attempts + 1 >= $2 THEN $3
                    ELSE $4
                END,
                processed_at = CASE WHEN requeue = 0 AND attempts + 1 >= $5 THEN $6 ELSE NULL END,
                attempts = CASE WHEN requeue = 1 THEN 0 ELSE attempts + 1 END,
                next_attempt_at = $7,
                last_error = $8,
                requeue = 0,
                claimed_at = NULL,
                updated_at = $9
            WHERE id = $10 AND status = $11
            RETURNING status
            "#,
        )
        .bind(retried.as_str())
        .bind(i64::from(max_attempts))
        .bind(failed.as_str())
        .bind(retried.as_str())
        .bind(i64::from(max_attempts))
        .bind(to_timestamp(now))
        .bind(to_timestamp(next_attempt_at))
        .bind(error)
        .bind(to_timestamp(now))
        .bind(id)
        .bind(SyncStatus::Processing.as_str())
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to record retry for queue item: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        final_status(id, row)
    }

    async fn fail(&self, id: i64, error: &str, now: DateTime<Utc>) -> Result<SyncStatus, DbError> {
        let retried = transition(SyncStatus::Processing, QueueEvent::Retry)?;
        let failed = transition(SyncStatus::Processing, QueueEvent::Fail)?;

        let row = sqlx::query(
            r#"
            UPDATE gcal_sync_queue SET
                status = CASE WHEN requeue = 1 THEN $1 ELSE $2 END,
                processed_at = CASE WHEN requeue = 1 THEN NULL ELSE $3 END,
                attempts = CASE WHEN requeue = 1 THEN 0 ELSE attempts + 1 END,
                next_attempt_at = $4,
                last_error = $5,
                requeue = 0,
                claimed_at = NULL,
                updated_at = $6
            WHERE id = $7 AND status = $8
            RETURNING status
            "#,
        )
        .bind(retried.as_str())
        .bind(failed.as_str())
        .bind(to_timestamp(now))
        .bind(to_timestamp(now))
        .bind(error)
        .bind(to_timestamp(now))
        .bind(id)
        .bind(SyncStatus::Processing.as_str())
        .fetch_optional(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to record failure for queue item: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        final_status(id, row)
    }

    async fn reset_stale(
        &self,
        claimed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let reaped = transition(SyncStatus::Processing, QueueEvent::Reap)?;

        let result = sqlx::query(
            r#"
            UPDATE gcal_sync_queue SET status = $1, claimed_at = NULL, updated_at = $2
            WHERE status = $3 AND claimed_at < $4
            "#,
        )
        .bind(reaped.as_str())
        .bind(to_timestamp(now))
        .bind(SyncStatus::Processing.as_str())
        .bind(to_timestamp(claimed_before))
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to reset stale queue items: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        if result.rows_affected() > 0 {
            warn!("Reset {} stale queue item(s) to pending", result.rows_affected());
        }
        Ok(result.rows_affected())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<SyncQueueItem>, DbError> {
        let query = format!(
            "SELECT {} FROM gcal_sync_queue ORDER BY updated_at DESC, id DESC LIMIT $1",
            QUEUE_COLUMNS
        );
        self.fetch_items(&query, Some(i64::from(limit))).await
    }

    async fn count_by_status(&self, today_start: DateTime<Utc>) -> Result<QueueStatusCounts, DbError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM gcal_sync_queue GROUP BY status")
            .fetch_all(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to count queue items: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        let mut counts = QueueStatusCounts::default();
        for row in &rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| DbError::DecodeError(e.to_string()))?;
            let count: i64 = row
                .try_get("count")
                .map_err(|e| DbError::DecodeError(e.to_string()))?;
            match status.parse::<SyncStatus>() {
                Ok(SyncStatus::Pending) => counts.pending += count,
                Ok(SyncStatus::Processing) => counts.processing += count,
                Ok(SyncStatus::Completed) => counts.completed += count,
                Ok(SyncStatus::Failed) | Err(_) => counts.failed += count,
            }
        }

        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM gcal_sync_queue WHERE status = $1 AND processed_at >= $2",
        )
        .bind(SyncStatus::Completed.as_str())
        .bind(to_timestamp(today_start))
        .fetch_one(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to count items completed today: {}", e);
            DbError::QueryError(e.to_string())
        })?;
        counts.completed_today = row
            .try_get("count")
            .map_err(|e| DbError::DecodeError(e.to_string()))?;

        Ok(counts)
    }

    async fn purge_completed(&self, processed_before: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM gcal_sync_queue WHERE status = $1 AND processed_at < $2",
        )
        .bind(SyncStatus::Completed.as_str())
        .bind(to_timestamp(processed_before))
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to purge completed queue items: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        info!("Purged {} completed queue item(s)", result.rows_affected());
        Ok(result.rows_affected())
    }
}

/// Decode the status returned by an outcome update, which only applies to processing items.
fn final_status(id: i64, row: Option<AnyRow>) -> Result<SyncStatus, DbError> {
    let row = row.ok_or_else(|| {
        DbError::InvalidTransition(format!("queue item {} is no longer processing", id))
    })?;
    let status: String = row
        .try_get("status")
        .map_err(|e| DbError::DecodeError(e.to_string()))?;
    status
        .parse::<SyncStatus>()
        .map_err(|e| DbError::DecodeError(e.to_string()))
}
