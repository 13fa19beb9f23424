//! SQL implementation of the booking repository

use crate::error::DbError;
use crate::repositories::booking::{Booking, BookingRepository, NewBooking};
use crate::DbClient;
use chrono::NaiveDateTime;
use connectify_common::models::LOCAL_DATETIME_FORMAT;
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::{debug, error, info};

const BOOKING_COLUMNS: &str = "id, specialist_id, service_name, client_name, client_phone, \
     start_local, end_local, workpoint_country, workpoint_address, created_on, received_through, \
     cancelled, remote_event_id";

/// SQL implementation of the booking repository
#[derive(Debug, Clone)]
pub struct SqlBookingRepository {
    db_client: DbClient,
}

impl SqlBookingRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    fn parse_local(id: i64, column: &str, raw: &str) -> Result<NaiveDateTime, DbError> {
        NaiveDateTime::parse_from_str(raw, LOCAL_DATETIME_FORMAT).map_err(|e| {
            DbError::DecodeError(format!("booking {} has invalid {} '{}': {}", id, column, raw, e))
        })
    }

    fn map_row(row: &AnyRow) -> Result<Booking, DbError> {
        let decode = |e: sqlx::Error| DbError::DecodeError(e.to_string());

        let id: i64 = row.try_get("id").map_err(decode)?;
        let start_raw: String = row.try_get("start_local").map_err(decode)?;
        let end_raw: String = row.try_get("end_local").map_err(decode)?;
        let cancelled: i64 = row.try_get("cancelled").unwrap_or_default();

        Ok(Booking {
            id,
            specialist_id: row.try_get("specialist_id").map_err(decode)?,
            service_name: row.try_get("service_name").unwrap_or_default(),
            client_name: row.try_get("client_name").unwrap_or_default(),
            client_phone: row.try_get("client_phone").unwrap_or_default(),
            start_local: Self::parse_local(id, "start_local", &start_raw)?,
            end_local: Self::parse_local(id, "end_local", &end_raw)?,
            workpoint_country: row.try_get("workpoint_country").unwrap_or_default(),
            workpoint_address: row.try_get("workpoint_address").unwrap_or_default(),
            created_on: row.try_get("created_on").unwrap_or_default(),
            received_through: row.try_get("received_through").unwrap_or_default(),
            cancelled: cancelled != 0,
            remote_event_id: row.try_get("remote_event_id").unwrap_or_default(),
        })
    }
}

impl BookingRepository for SqlBookingRepository {
    async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing booking schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS bookings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                specialist_id INTEGER NOT NULL,
                service_name TEXT,
                client_name TEXT,
                client_phone TEXT,
                start_local TEXT NOT NULL,
                end_local TEXT NOT NULL,
                workpoint_country TEXT,
                workpoint_address TEXT,
                created_on TEXT,
                received_through TEXT,
                cancelled INTEGER NOT NULL DEFAULT 0,
                remote_event_id TEXT
            )
        "#;
        self.db_client.execute(query).await?;
        self.db_client
            .execute(
                "CREATE INDEX IF NOT EXISTS ix_bookings_specialist_start ON bookings (specialist_id, start_local)",
            )
            .await?;

        info!("Booking schema initialized successfully");
        Ok(())
    }

    async fn insert(&self, booking: &NewBooking) -> Result<Booking, DbError> {
        debug!("Inserting booking for specialist: {}", booking.specialist_id);

        let query = format!(
            r#"
            INSERT INTO bookings
                (specialist_id, service_name, client_name, client_phone, start_local, end_local,
                 workpoint_country, workpoint_address, created_on, received_through, cancelled,
                 remote_event_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(booking.specialist_id)
            .bind(booking.service_name.clone())
            .bind(booking.client_name.clone())
            .bind(booking.client_phone.clone())
            .bind(booking.start_local.format(LOCAL_DATETIME_FORMAT).to_string())
            .bind(booking.end_local.format(LOCAL_DATETIME_FORMAT).to_string())
            .bind(booking.workpoint_country.clone())
            .bind(booking.workpoint_address.clone())
            .bind(booking.created_on.clone())
            .bind(booking.received_through.clone())
            .bind(booking.remote_event_id.clone())
            .fetch_one(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to insert booking: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        Self::map_row(&row)
    }

    async fn find_by_id(&self, booking_id: i64) -> Result<Option<Booking>, DbError> {
        let query = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query(&query)
            .bind(booking_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find booking: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_upcoming_for_specialist(
        &self,
        specialist_id: i64,
        from_local: NaiveDateTime,
        limit: u32,
    ) -> Result<Vec<Booking>, DbError> {
        // The fixed-width text format sorts chronologically
        let query = format!(
            r#"
            SELECT {} FROM bookings
            WHERE specialist_id = $1 AND cancelled = 0 AND start_local > $2
            ORDER BY start_local ASC, id ASC
            LIMIT $3
            "#,
            BOOKING_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(specialist_id)
            .bind(from_local.format(LOCAL_DATETIME_FORMAT).to_string())
            .bind(i64::from(limit))
            .fetch_all(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find upcoming bookings: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        rows.iter().map(Self::map_row).collect()
    }

    async fn find_duplicate(
        &self,
        specialist_id: i64,
        remote_event_id: &str,
        start_local: NaiveDateTime,
        client_name: &str,
    ) -> Result<Option<Booking>, DbError> {
        let query = format!(
            r#"
            SELECT {} FROM bookings
            WHERE specialist_id = $1
              AND (remote_event_id = $2 OR (start_local = $3 AND client_name = $4))
            ORDER BY id ASC
            LIMIT 1
            "#,
            BOOKING_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(specialist_id)
            .bind(remote_event_id)
            .bind(start_local.format(LOCAL_DATETIME_FORMAT).to_string())
            .bind(client_name)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to look up duplicate booking: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn set_remote_event_id(
        &self,
        booking_id: i64,
        remote_event_id: Option<&str>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE bookings SET remote_event_id = $1 WHERE id = $2")
            .bind(remote_event_id)
            .bind(booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to store remote event reference: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_cancelled(&self, booking_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE bookings SET cancelled = 1 WHERE id = $1")
            .bind(booking_id)
            .execute(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to cancel booking: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        Ok(result.rows_affected() == 1)
    }
}
