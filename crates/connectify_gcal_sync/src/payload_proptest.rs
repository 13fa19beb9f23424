#[cfg(test)]
mod tests {
    use crate::payload::{build, local_to_utc};
    use crate::timezone::zone_for_country;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use connectify_common::models::Booking;
    use proptest::prelude::*;

    const COUNTRIES: [&str; 8] = ["GB", "DE", "RO", "PT", "FI", "TR", "IS", "CY"];

    fn booking(start: NaiveDateTime, minutes: i64) -> Booking {
        Booking {
            id: 1,
            specialist_id: 1,
            service_name: None,
            client_name: None,
            client_phone: None,
            start_local: start,
            end_local: start + Duration::minutes(minutes),
            workpoint_country: None,
            workpoint_address: None,
            created_on: None,
            received_through: None,
            cancelled: false,
            remote_event_id: None,
        }
    }

    proptest! {
        // Times outside DST gaps convert back to the same wall clock
        #[test]
        fn test_local_time_round_trips_through_zone(
            day_offset in 0..730i64,
            minute_of_day in 0..1440i64,
            country_idx in 0..8usize,
        ) {
            let zone = zone_for_country(COUNTRIES[country_idx]).unwrap();
            let local = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
                + Duration::days(day_offset)
                + Duration::minutes(minute_of_day);

            let utc = local_to_utc(local, zone).unwrap();
            let back = utc.with_timezone(&zone).naive_local();

            // Either the wall clock survives, or it sat in a gap and moved one hour forward
            prop_assert!(back == local || back == local + Duration::hours(1));
        }

        // A positive duration always yields an event that ends after it starts
        #[test]
        fn test_events_end_after_they_start(
            day_offset in 0..730i64,
            hour in 6..20u32,
            minutes in 15..240i64,
            country_idx in 0..8usize,
        ) {
            let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
                .and_hms_opt(hour, 0, 0).unwrap()
                + Duration::days(day_offset);
            let payload = build(&booking(start, minutes), None, Some(COUNTRIES[country_idx])).unwrap();

            prop_assert!(payload.end_utc > payload.start_utc);
            prop_assert_eq!((payload.end_utc - payload.start_utc).num_minutes(), minutes);
        }
    }
}
