//! Repository modules for database access
//!
//! Each entity has a trait describing its operations and a SQL implementation on top of
//! [`DbClient`](crate::DbClient). Timestamps are stored as unix seconds.

pub mod booking;
pub mod booking_sql;
pub mod credential;
pub mod credential_sql;
pub mod sync_queue;
pub mod sync_queue_sql;

#[cfg(test)]
mod booking_test;
#[cfg(test)]
mod sync_queue_test;

pub use booking::{Booking, BookingRepository, NewBooking};
pub use booking_sql::SqlBookingRepository;
pub use credential::{Credential, CredentialRepository, CredentialStatus};
pub use credential_sql::SqlCredentialRepository;
pub use sync_queue::{EnqueueOutcome, SyncQueueRepository};
pub use sync_queue_sql::SqlSyncQueueRepository;

use chrono::{DateTime, Utc};

pub(crate) fn to_timestamp(value: DateTime<Utc>) -> i64 {
    value.timestamp()
}

pub(crate) fn from_timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(seconds, 0).unwrap_or_default()
}

pub(crate) fn from_timestamp_opt(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds.and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
}
