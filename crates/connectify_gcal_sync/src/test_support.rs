//! Fixtures shared by the service, worker and route tests.

use crate::credentials::CredentialSettings;
use crate::provider::mock::MockCalendarProvider;
use crate::service::GcalSyncService;
use crate::worker::WorkerSettings;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use connectify_common::models::{Booking, NewBooking};
use connectify_common::CalendarProvider;
use connectify_db::{
    BookingRepository, CredentialRepository, DbClient, SqlBookingRepository,
    SqlCredentialRepository, SqlSyncQueueRepository,
};
use std::sync::Arc;

pub struct Harness {
    pub service: Arc<GcalSyncService>,
    pub provider: Arc<MockCalendarProvider>,
    pub queue: SqlSyncQueueRepository,
    pub bookings: SqlBookingRepository,
    pub credentials: SqlCredentialRepository,
}

pub async fn harness() -> Harness {
    harness_with(WorkerSettings::default()).await
}

pub async fn harness_with(settings: WorkerSettings) -> Harness {
    let client = DbClient::from_url("sqlite::memory:")
        .await
        .expect("in-memory database");
    let provider = Arc::new(MockCalendarProvider::new());
    let dyn_provider: Arc<dyn CalendarProvider> = provider.clone();
    let service = Arc::new(GcalSyncService::new(
        client.clone(),
        dyn_provider,
        CredentialSettings::default(),
        settings,
        500,
    ));
    service.init_schema().await.expect("schema");

    Harness {
        service,
        provider,
        queue: SqlSyncQueueRepository::new(client.clone()),
        bookings: SqlBookingRepository::new(client.clone()),
        credentials: SqlCredentialRepository::new(client),
    }
}

impl Harness {
    /// Run the OAuth flow for a specialist against the mock provider.
    pub async fn connect(&self, specialist_id: i64) {
        let manager = self.service.credentials();
        manager.begin_authorization(specialist_id).await.unwrap();
        let state = self
            .credentials
            .find_by_specialist(specialist_id)
            .await
            .unwrap()
            .and_then(|c| c.oauth_state)
            .expect("pending state");
        manager
            .complete_authorization(specialist_id, &state, "code")
            .await
            .unwrap();
    }

    /// Let the stored access token expire within the refresh buffer.
    pub async fn expire_token(&self, specialist_id: i64) {
        let now = Utc::now();
        self.credentials
            .store_refreshed_token(
                specialist_id,
                "old-token",
                None,
                now + chrono::Duration::minutes(1),
                now,
            )
            .await
            .unwrap();
    }

    pub async fn insert_booking(
        &self,
        specialist_id: i64,
        start_local: NaiveDateTime,
        end_local: NaiveDateTime,
    ) -> Booking {
        self.bookings
            .insert(&NewBooking {
                specialist_id,
                service_name: Some("Consultation".to_string()),
                client_name: Some("Maria Ionescu".to_string()),
                client_phone: Some("+40 700 000 000".to_string()),
                start_local,
                end_local,
                workpoint_country: Some("RO".to_string()),
                workpoint_address: Some("Bd. Unirii 10".to_string()),
                created_on: Some("2026-10-01".to_string()),
                received_through: Some("phone".to_string()),
                remote_event_id: None,
            })
            .await
            .unwrap()
    }

    pub async fn remote_event_id(&self, booking_id: i64) -> Option<String> {
        self.bookings
            .find_by_id(booking_id)
            .await
            .unwrap()
            .and_then(|b| b.remote_event_id)
    }
}

/// Wall-clock time in the year after the current one, so bookings are always upcoming.
pub fn future(month: u32, day: u32, hour: u32) -> NaiveDateTime {
    let year = Utc::now().year() + 1;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid date")
}
