//! Repository for bookings
//!
//! The sync engine reads bookings to build remote events and keeps the remote event
//! reference on the booking row.

use crate::error::DbError;
use chrono::NaiveDateTime;

pub use connectify_common::models::{Booking, NewBooking};

/// Repository for bookings
pub trait BookingRepository {
    /// Create the `bookings` table if it does not exist yet
    fn init_schema(&self) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    /// Insert a booking and return it with its assigned id
    fn insert(
        &self,
        booking: &NewBooking,
    ) -> impl std::future::Future<Output = Result<Booking, DbError>> + Send;

    /// Find a booking by id
    fn find_by_id(
        &self,
        booking_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Booking>, DbError>> + Send;

    /// Non-cancelled bookings of a specialist starting after `from_local`, earliest first
    fn find_upcoming_for_specialist(
        &self,
        specialist_id: i64,
        from_local: NaiveDateTime,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Booking>, DbError>> + Send;

    /// Booking of a specialist that already stands for a remote event
    ///
    /// Matches either the stored remote event reference or the same start time and client
    /// name, cancelled bookings included.
    fn find_duplicate(
        &self,
        specialist_id: i64,
        remote_event_id: &str,
        start_local: NaiveDateTime,
        client_name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Booking>, DbError>> + Send;

    /// Store or clear the remote event reference of a booking
    ///
    /// # Returns
    ///
    /// `true` if the booking exists
    fn set_remote_event_id(
        &self,
        booking_id: i64,
        remote_event_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    /// Mark a booking as cancelled
    fn mark_cancelled(
        &self,
        booking_id: i64,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;
}
