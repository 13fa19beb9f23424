#[cfg(test)]
mod tests {
    use crate::repositories::sync_queue::{SyncAction, SyncStatus};
    use crate::repositories::{SqlSyncQueueRepository, SyncQueueRepository};
    use crate::{DbClient, DbError};
    use chrono::{Duration, Utc};

    async fn repository() -> SqlSyncQueueRepository {
        let client = DbClient::from_url("sqlite::memory:")
            .await
            .expect("in-memory database");
        let repo = SqlSyncQueueRepository::new(client);
        repo.init_schema().await.expect("schema");
        repo
    }

    #[tokio::test]
    async fn test_enqueue_inserts_pending_item() {
        let repo = repository().await;
        let outcome = repo
            .enqueue(100, 7, SyncAction::Create, Utc::now())
            .await
            .unwrap();

        assert!(!outcome.superseded);
        assert_eq!(outcome.item.booking_id, 100);
        assert_eq!(outcome.item.status, SyncStatus::Pending);
        assert_eq!(outcome.item.action, SyncAction::Create);
        assert_eq!(outcome.item.attempts, 0);
    }

    #[tokio::test]
    async fn test_enqueue_supersedes_pending_item() {
        let repo = repository().await;
        let now = Utc::now();
        let first = repo.enqueue(100, 7, SyncAction::Create, now).await.unwrap();
        let second = repo.enqueue(100, 7, SyncAction::Delete, now).await.unwrap();

        assert!(second.superseded);
        assert_eq!(second.item.id, first.item.id);
        assert_eq!(second.item.action, SyncAction::Delete);

        let counts = repo.count_by_status(now).await.unwrap();
        assert_eq!(counts.pending, 1);
    }

    #[tokio::test]
    async fn test_enqueue_during_processing_sets_requeue() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(100, 7, SyncAction::Create, now).await.unwrap();
        let claimed = repo.claim_batch(10, None, now).await.unwrap();
        assert_eq!(claimed.len(), 1);

        let outcome = repo.enqueue(100, 7, SyncAction::Update, now).await.unwrap();
        assert!(outcome.superseded);
        assert!(outcome.item.requeue);
        assert_eq!(outcome.item.status, SyncStatus::Processing);

        let status = repo.complete(claimed[0].id, now).await.unwrap();
        assert_eq!(status, SyncStatus::Pending);

        let item = repo.find_by_id(claimed[0].id).await.unwrap().unwrap();
        assert_eq!(item.action, SyncAction::Update);
        assert!(!item.requeue);
    }

    #[tokio::test]
    async fn test_enqueue_after_completion_creates_new_item() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(100, 7, SyncAction::Create, now).await.unwrap();
        let claimed = repo.claim_batch(10, None, now).await.unwrap();
        repo.complete(claimed[0].id, now).await.unwrap();

        let outcome = repo.enqueue(100, 7, SyncAction::Update, now).await.unwrap();
        assert!(!outcome.superseded);
        assert_ne!(outcome.item.id, claimed[0].id);
    }

    #[tokio::test]
    async fn test_claim_batch_respects_limit_order_and_filter() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(1, 7, SyncAction::Create, now - Duration::seconds(30)).await.unwrap();
        repo.enqueue(2, 8, SyncAction::Create, now - Duration::seconds(20)).await.unwrap();
        repo.enqueue(3, 7, SyncAction::Create, now - Duration::seconds(10)).await.unwrap();

        let only_seven = repo.claim_batch(10, Some(7), now).await.unwrap();
        let bookings: Vec<i64> = only_seven.iter().map(|i| i.booking_id).collect();
        assert_eq!(bookings, vec![1, 3]);
        assert!(only_seven.iter().all(|i| i.status == SyncStatus::Processing));
        assert!(only_seven.iter().all(|i| i.claimed_at.is_some()));

        let rest = repo.claim_batch(10, None, now).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].booking_id, 2);

        assert!(repo.claim_batch(10, None, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_batch_skips_items_not_yet_due() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(1, 7, SyncAction::Create, now).await.unwrap();
        let claimed = repo.claim_batch(1, None, now).await.unwrap();
        let status = repo
            .retry_or_fail(claimed[0].id, "503", 5, now + Duration::seconds(60), now)
            .await
            .unwrap();
        assert_eq!(status, SyncStatus::Pending);

        assert!(repo.claim_batch(10, None, now).await.unwrap().is_empty());
        let later = repo
            .claim_batch(10, None, now + Duration::seconds(61))
            .await
            .unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_fails_item() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(1, 7, SyncAction::Create, now).await.unwrap();

        let mut last = SyncStatus::Pending;
        for _ in 0..3 {
            let claimed = repo.claim_batch(1, None, now).await.unwrap();
            assert_eq!(claimed.len(), 1);
            last = repo
                .retry_or_fail(claimed[0].id, "rate limited", 3, now, now)
                .await
                .unwrap();
        }

        assert_eq!(last, SyncStatus::Failed);
        let item = repo.list_recent(1).await.unwrap().remove(0);
        assert_eq!(item.attempts, 3);
        assert_eq!(item.last_error.as_deref(), Some("rate limited"));
        assert!(item.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_fail_is_terminal_and_outcomes_need_processing() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(1, 7, SyncAction::Create, now).await.unwrap();
        let claimed = repo.claim_batch(1, None, now).await.unwrap();

        let status = repo.fail(claimed[0].id, "invalid payload", now).await.unwrap();
        assert_eq!(status, SyncStatus::Failed);

        let again = repo.complete(claimed[0].id, now).await;
        assert!(matches!(again, Err(DbError::InvalidTransition(_))));
    }

    #[tokio::test]
    async fn test_reset_stale_returns_items_to_pending() {
        let repo = repository().await;
        let now = Utc::now();
        repo.enqueue(1, 7, SyncAction::Create, now - Duration::hours(1))
            .await
            .unwrap();
        repo.claim_batch(1, None, now - Duration::minutes(30))
            .await
            .unwrap();

        let reaped = repo
            .reset_stale(now - Duration::minutes(15), now)
            .await
            .unwrap();
        assert_eq!(reaped, 1);

        let item = repo.find_active_for_booking(1).await.unwrap().unwrap();
        assert_eq!(item.status, SyncStatus::Pending);
        assert!(item.claimed_at.is_none());
    }

    #[tokio::test]
    async fn test_counts_and_purge_completed() {
        let repo = repository().await;
        let now = Utc::now();
        for booking in 1..=3 {
            repo.enqueue(booking, 7, SyncAction::Create, now).await.unwrap();
        }
        let claimed = repo.claim_batch(2, None, now).await.unwrap();
        repo.complete(claimed[0].id, now - Duration::days(10)).await.unwrap();
        repo.complete(claimed[1].id, now).await.unwrap();

        let today_start = now - Duration::hours(1);
        let counts = repo.count_by_status(today_start).await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.completed, 2);
        assert_eq!(counts.completed_today, 1);
        assert_eq!(counts.total(), 3);

        let purged = repo.purge_completed(now - Duration::days(7)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(repo.count_by_status(today_start).await.unwrap().completed, 1);
    }
}
