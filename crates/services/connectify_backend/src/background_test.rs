#[cfg(test)]
mod tests {
    use crate::background::{run_tick, spawn, TickOptions};
    use chrono::NaiveDate;
    use connectify_common::models::{NewBooking, SyncAction, SyncStatus};
    use connectify_common::CalendarProvider;
    use connectify_db::{
        BookingRepository, CredentialRepository, DbClient, SqlBookingRepository,
        SqlCredentialRepository,
    };
    use connectify_gcal_sync::provider::mock::{MockCalendarProvider, MockOp};
    use connectify_gcal_sync::{CredentialSettings, GcalSyncService, WorkerSettings};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;

    struct Setup {
        service: Arc<GcalSyncService>,
        provider: Arc<MockCalendarProvider>,
        bookings: SqlBookingRepository,
    }

    async fn setup() -> Setup {
        let client = DbClient::from_url("sqlite::memory:").await.unwrap();
        let provider = Arc::new(MockCalendarProvider::new());
        let dyn_provider: Arc<dyn CalendarProvider> = provider.clone();
        let service = Arc::new(GcalSyncService::new(
            client.clone(),
            dyn_provider,
            CredentialSettings::default(),
            WorkerSettings::default(),
            500,
        ));
        service.init_schema().await.unwrap();

        let credentials = SqlCredentialRepository::new(client.clone());
        service.credentials().begin_authorization(7).await.unwrap();
        let state = credentials
            .find_by_specialist(7)
            .await
            .unwrap()
            .and_then(|c| c.oauth_state)
            .unwrap();
        service
            .credentials()
            .complete_authorization(7, &state, "code")
            .await
            .unwrap();

        Setup {
            service,
            provider,
            bookings: SqlBookingRepository::new(client),
        }
    }

    async fn queue_booking(s: &Setup, day: u32) -> i64 {
        let date = NaiveDate::from_ymd_opt(2030, 2, day).unwrap();
        let booking = s
            .bookings
            .insert(&NewBooking {
                specialist_id: 7,
                service_name: Some("Physio".to_string()),
                client_name: None,
                client_phone: None,
                start_local: date.and_hms_opt(9, 0, 0).unwrap(),
                end_local: date.and_hms_opt(10, 0, 0).unwrap(),
                workpoint_country: Some("CH".to_string()),
                workpoint_address: None,
                created_on: None,
                received_through: None,
                remote_event_id: None,
            })
            .await
            .unwrap();
        s.service
            .enqueue_booking_change(booking.id, 7, SyncAction::Create)
            .await
            .unwrap()
            .item
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_tick_processes_due_items() {
        let s = setup().await;
        queue_booking(&s, 3).await;
        queue_booking(&s, 4).await;

        let options = TickOptions {
            max_items: 10,
            specialist_id: None,
            reap: true,
        };
        let summary = run_tick(&s.service, options).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(s.provider.calls(MockOp::Create), 2);
    }

    #[tokio::test]
    async fn test_loop_runs_until_shutdown() {
        let s = setup().await;
        queue_booking(&s, 3).await;
        let (tx, rx) = watch::channel(false);

        let handle = spawn(
            s.service.clone(),
            TickOptions {
                max_items: 10,
                specialist_id: None,
                reap: true,
            },
            Duration::from_secs(60),
            rx,
        );
        // The first tick fires immediately
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop stops")
            .unwrap();

        let items = s.service.recent_items(10).await.unwrap();
        assert_eq!(items[0].status, SyncStatus::Completed);
    }
}
