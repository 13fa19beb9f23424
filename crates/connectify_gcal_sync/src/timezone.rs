//! Country to timezone resolution for workpoints

use chrono_tz::Tz;
use tracing::warn;

/// Zone used when a workpoint country is missing or unknown.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::London;

/// Resolve an ISO 3166-1 alpha-2 country code to its IANA zone.
///
/// The lookup is case-insensitive and ignores surrounding whitespace. `UK` is accepted as an
/// alias of `GB`. Returns `None` for countries outside the supported set.
pub fn zone_for_country(country: &str) -> Option<Tz> {
    use chrono_tz::{Asia, Atlantic, Europe};

    let zone = match country.trim().to_ascii_uppercase().as_str() {
        "GB" | "UK" => Europe::London,
        "IE" => Europe::Dublin,
        "FR" => Europe::Paris,
        "DE" => Europe::Berlin,
        "IT" => Europe::Rome,
        "ES" => Europe::Madrid,
        "PT" => Europe::Lisbon,
        "BE" => Europe::Brussels,
        "NL" => Europe::Amsterdam,
        "LU" => Europe::Luxembourg,
        "CH" => Europe::Zurich,
        "AT" => Europe::Vienna,
        "SE" => Europe::Stockholm,
        "NO" => Europe::Oslo,
        "DK" => Europe::Copenhagen,
        "FI" => Europe::Helsinki,
        "IS" => Atlantic::Reykjavik,
        "PL" => Europe::Warsaw,
        "CZ" => Europe::Prague,
        "SK" => Europe::Bratislava,
        "HU" => Europe::Budapest,
        "RO" => Europe::Bucharest,
        "BG" => Europe::Sofia,
        "HR" => Europe::Zagreb,
        "SI" => Europe::Ljubljana,
        "EE" => Europe::Tallinn,
        "LV" => Europe::Riga,
        "LT" => Europe::Vilnius,
        "GR" => Europe::Athens,
        "CY" => Asia::Nicosia,
        "MT" => Europe::Malta,
        "RS" => Europe::Belgrade,
        "ME" => Europe::Podgorica,
        "BA" => Europe::Sarajevo,
        "MK" => Europe::Skopje,
        "AL" => Europe::Tirane,
        "UA" => Europe::Kiev,
        "BY" => Europe::Minsk,
        "MD" => Europe::Chisinau,
        "TR" => Europe::Istanbul,
        _ => return None,
    };
    Some(zone)
}

/// Resolve a workpoint country, falling back to `default` when it is missing or unknown.
pub fn resolve(country: Option<&str>, default: Tz) -> Tz {
    match country.filter(|c| !c.trim().is_empty()) {
        Some(code) => zone_for_country(code).unwrap_or_else(|| {
            warn!("Unknown workpoint country '{}', using {}", code, default.name());
            default
        }),
        None => default,
    }
}
