#[cfg(test)]
mod tests {
    use crate::repositories::{BookingRepository, NewBooking, SqlBookingRepository};
    use crate::DbClient;
    use chrono::NaiveDate;

    async fn repository() -> SqlBookingRepository {
        let client = DbClient::from_url("sqlite::memory:")
            .await
            .expect("in-memory database");
        let repo = SqlBookingRepository::new(client);
        repo.init_schema().await.expect("schema");
        repo
    }

    fn booking(specialist_id: i64, day: u32, hour: u32) -> NewBooking {
        let date = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        NewBooking {
            specialist_id,
            service_name: Some("Haircut".to_string()),
            client_name: Some("Ana".to_string()),
            client_phone: None,
            start_local: date.and_hms_opt(hour, 0, 0).unwrap(),
            end_local: date.and_hms_opt(hour + 1, 0, 0).unwrap(),
            workpoint_country: Some("RO".to_string()),
            workpoint_address: Some("Str. Lipscani 1, Bucharest".to_string()),
            created_on: Some("2026-03-01".to_string()),
            received_through: Some("web".to_string()),
            remote_event_id: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repository().await;
        let inserted = repo.insert(&booking(7, 10, 9)).await.unwrap();

        let found = repo.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(found.specialist_id, 7);
        assert_eq!(found.start_local, booking(7, 10, 9).start_local);
        assert_eq!(found.client_phone, None);
        assert!(!found.cancelled);
        assert!(found.remote_event_id.is_none());
        assert!(repo.find_by_id(inserted.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_event_id_roundtrip() {
        let repo = repository().await;
        let inserted = repo.insert(&booking(7, 10, 9)).await.unwrap();

        assert!(repo.set_remote_event_id(inserted.id, Some("evt-1")).await.unwrap());
        let found = repo.find_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(found.remote_event_id.as_deref(), Some("evt-1"));

        repo.set_remote_event_id(inserted.id, None).await.unwrap();
        let cleared = repo.find_by_id(inserted.id).await.unwrap().unwrap();
        assert!(cleared.remote_event_id.is_none());

        assert!(!repo.set_remote_event_id(999, Some("evt-2")).await.unwrap());
    }

    #[tokio::test]
    async fn test_upcoming_excludes_past_cancelled_and_other_specialists() {
        let repo = repository().await;
        let past = repo.insert(&booking(7, 1, 9)).await.unwrap();
        let later = repo.insert(&booking(7, 20, 15)).await.unwrap();
        let sooner = repo.insert(&booking(7, 12, 8)).await.unwrap();
        let cancelled = repo.insert(&booking(7, 15, 10)).await.unwrap();
        repo.insert(&booking(8, 12, 8)).await.unwrap();
        repo.mark_cancelled(cancelled.id).await.unwrap();

        let from = NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let upcoming = repo.find_upcoming_for_specialist(7, from, 10).await.unwrap();

        let ids: Vec<i64> = upcoming.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![sooner.id, later.id]);
        assert!(!ids.contains(&past.id));

        let limited = repo.find_upcoming_for_specialist(7, from, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_duplicate_by_remote_event_or_slot_and_client() {
        let repo = repository().await;
        let imported = repo
            .insert(&NewBooking {
                remote_event_id: Some("evt-9".to_string()),
                received_through: Some("GoogleCal_Import".to_string()),
                ..booking(7, 10, 9)
            })
            .await
            .unwrap();
        assert_eq!(imported.remote_event_id.as_deref(), Some("evt-9"));

        let other_slot = booking(7, 11, 9).start_local;
        let by_event = repo.find_duplicate(7, "evt-9", other_slot, "Nobody").await.unwrap();
        assert_eq!(by_event.map(|b| b.id), Some(imported.id));

        let same_slot = booking(7, 10, 9).start_local;
        let by_slot = repo.find_duplicate(7, "evt-x", same_slot, "Ana").await.unwrap();
        assert_eq!(by_slot.map(|b| b.id), Some(imported.id));

        assert!(repo
            .find_duplicate(7, "evt-x", same_slot, "Someone else")
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_duplicate(8, "evt-9", same_slot, "Ana")
            .await
            .unwrap()
            .is_none());
    }
}
