//! Event payload builder
//!
//! Turns a booking into the provider-agnostic [`EventPayload`]. Booking times are wall-clock
//! times at the workpoint, so they are resolved against the workpoint's zone (never a fixed
//! offset) before being converted to UTC instants.

use crate::error::PayloadError;
use crate::timezone::{self, DEFAULT_TIMEZONE};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use connectify_common::models::Booking;
use connectify_common::EventPayload;
use tracing::warn;

const DEFAULT_TITLE: &str = "Booking";
const MISSING: &str = "N/A";

/// Build the remote event for a booking using [`DEFAULT_TIMEZONE`] as the fallback zone.
pub fn build(
    booking: &Booking,
    service_name: Option<&str>,
    workpoint_country: Option<&str>,
) -> Result<EventPayload, PayloadError> {
    build_with_default(booking, service_name, workpoint_country, DEFAULT_TIMEZONE)
}

/// Build the remote event for a booking.
///
/// # Errors
///
/// * [`PayloadError::InvalidRange`] if the booking does not end after it starts
/// * [`PayloadError::NonexistentLocalTime`] if a wall-clock time cannot be placed in the zone
pub fn build_with_default(
    booking: &Booking,
    service_name: Option<&str>,
    workpoint_country: Option<&str>,
    default_zone: Tz,
) -> Result<EventPayload, PayloadError> {
    let zone = timezone::resolve(workpoint_country, default_zone);

    let start_utc = local_to_utc(booking.start_local, zone)?;
    let end_utc = local_to_utc(booking.end_local, zone)?;
    if end_utc <= start_utc {
        return Err(PayloadError::InvalidRange {
            booking_id: booking.id,
        });
    }

    let title = present(service_name).unwrap_or(DEFAULT_TITLE).to_string();

    Ok(EventPayload {
        title,
        description: describe(booking, service_name),
        start_utc,
        end_utc,
        location: present(booking.workpoint_address.as_deref()).map(str::to_string),
        time_zone: zone.name().to_string(),
    })
}

/// Convert a wall-clock time in `zone` to a UTC instant.
///
/// An ambiguous time (clocks going back) maps to its earlier instant. A time inside a
/// spring-forward gap is moved one hour later, which is where the wall clock lands.
pub fn local_to_utc(local: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, PayloadError> {
    match zone.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            warn!("{} falls into a DST gap in {}, shifting by one hour", local, zone.name());
            zone.from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| PayloadError::NonexistentLocalTime {
                    local,
                    zone: zone.name().to_string(),
                })
        }
    }
}

fn describe(booking: &Booking, service_name: Option<&str>) -> String {
    format!(
        "Booking ID: {}\nClient: {}\nPhone: {}\nService: {}\nBooked on: {}\nBooked via: {}",
        booking.id,
        or_missing(booking.client_name.as_deref()),
        or_missing(booking.client_phone.as_deref()),
        or_missing(service_name),
        or_missing(booking.created_on.as_deref()),
        or_missing(booking.received_through.as_deref()),
    )
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn or_missing(value: Option<&str>) -> &str {
    present(value).unwrap_or(MISSING)
}
