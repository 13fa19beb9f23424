//! Import of existing remote calendar events as bookings.
//!
//! Specialists who kept their agenda in Google Calendar before connecting can pull those
//! events in once. Each timed event becomes a booking; the client name, phone number and
//! service are guessed from the event text.

use chrono::{NaiveDate, NaiveDateTime};
use connectify_common::RemoteEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Channel recorded on bookings created by an import.
pub const IMPORT_CHANNEL: &str = "GoogleCal_Import";
/// Stored when no phone number can be found in the event text.
pub const UNKNOWN_PHONE: &str = "0000000000";
/// Most events read from the remote calendar per import.
pub const MAX_IMPORT_EVENTS: u32 = 100;
/// Title used for events without a summary.
const UNTITLED: &str = "No Title";
const MIN_PHONE_LEN: usize = 9;

static LABELED_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:phone|tel|telefon|mobile|cell)[\s:]*([+\d\s\-()]+)")
        .expect("LABELED_PHONE pattern is valid")
});

static LABELED_CLIENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:client|customer|name)[:\s]*([^,\n]+)")
        .expect("LABELED_CLIENT pattern is valid")
});

/// Keywords that select a service when found in the event text.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMapping {
    pub keywords: Vec<String>,
    pub service_name: String,
}

/// What to import and how to fill in the booking fields.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Checked in order; the first keyword found wins.
    pub service_mappings: Vec<ServiceMapping>,
    /// Service of events no mapping matches.
    pub default_service: Option<String>,
    /// Country of the workpoint; also decides the local time of the bookings.
    pub workpoint_country: Option<String>,
    pub workpoint_address: Option<String>,
    /// Report what would be imported without writing bookings.
    pub preview_only: bool,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Imported,
    /// Preview mode: the event would be imported.
    WillImport,
    Skipped,
    Failed,
}

/// Outcome for one remote event.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct ImportedEvent {
    pub event_id: String,
    pub summary: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub start_local: Option<NaiveDateTime>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub end_local: Option<NaiveDateTime>,
    pub all_day: bool,
    pub status: ImportStatus,
    pub reason: Option<String>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub service_name: Option<String>,
    pub booking_id: Option<i64>,
}

impl ImportedEvent {
    pub(crate) fn new(event: &RemoteEvent) -> Self {
        Self {
            event_id: event.id.clone(),
            summary: event.summary.clone(),
            start_local: None,
            end_local: None,
            all_day: false,
            status: ImportStatus::Skipped,
            reason: None,
            client_name: None,
            client_phone: None,
            service_name: None,
            booking_id: None,
        }
    }

    pub(crate) fn skip(mut self, reason: impl Into<String>) -> Self {
        self.status = ImportStatus::Skipped;
        self.reason = Some(reason.into());
        self
    }
}

/// Result of importing a date range of a specialist's calendar.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub specialist_id: i64,
    pub preview: bool,
    pub imported: u32,
    pub skipped: u32,
    pub failed: u32,
    pub events: Vec<ImportedEvent>,
}

impl ImportReport {
    pub(crate) fn record(&mut self, event: ImportedEvent) {
        match event.status {
            ImportStatus::Imported | ImportStatus::WillImport => self.imported += 1,
            ImportStatus::Skipped => self.skipped += 1,
            ImportStatus::Failed => self.failed += 1,
        }
        self.events.push(event);
    }
}

/// Booking fields guessed from the text of a remote event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub client_name: String,
    pub client_phone: String,
    pub service_name: Option<String>,
}

/// Guess client, phone and service from an event's title, description and location.
pub fn extract_fields(
    event: &RemoteEvent,
    mappings: &[ServiceMapping],
    default_service: Option<&str>,
) -> ExtractedFields {
    let title = event.summary.as_deref().unwrap_or(UNTITLED);
    let description = event.description.as_deref().unwrap_or_default();
    let location = event.location.as_deref().unwrap_or_default();
    let all_text = format!("{} {} {}", title, description, location);

    let mut client_name = LABELED_CLIENT
        .captures(description)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| title.to_string());

    let matched = match_service(&all_text, mappings);
    let service_name = matched
        .map(|(_, mapping)| mapping.service_name.clone())
        .or_else(|| default_service.map(str::to_string));

    if let Some((keyword, mapping)) = matched {
        let cleaned = remove_word(&remove_word(&client_name, keyword), &mapping.service_name);
        if !cleaned.is_empty() {
            client_name = cleaned;
        }
    }

    ExtractedFields {
        client_name,
        client_phone: extract_phone(&all_text).unwrap_or_else(|| UNKNOWN_PHONE.to_string()),
        service_name,
    }
}

/// Find a phone number in free text.
///
/// A number after a label such as `tel:` is preferred. Otherwise the first whitespace
/// separated word holding at least nine digits is used, with separators dropped.
pub fn extract_phone(text: &str) -> Option<String> {
    let labeled = LABELED_PHONE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '+')
                .collect::<String>()
        })
        .filter(|phone| phone.len() >= MIN_PHONE_LEN);
    if labeled.is_some() {
        return labeled;
    }

    text.split_whitespace()
        .map(|word| word.chars().filter(char::is_ascii_digit).collect::<String>())
        .find(|digits| digits.len() >= MIN_PHONE_LEN)
}

fn match_service<'a>(
    text: &str,
    mappings: &'a [ServiceMapping],
) -> Option<(&'a str, &'a ServiceMapping)> {
    let lower = text.to_lowercase();
    mappings.iter().find_map(|mapping| {
        mapping
            .keywords
            .iter()
            .map(|k| k.trim())
            .find(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
            .map(|keyword| (keyword, mapping))
    })
}

/// Remove whole-word, case-insensitive occurrences of `word` and collapse whitespace.
fn remove_word(text: &str, word: &str) -> String {
    let word = word.trim();
    let stripped = if word.is_empty() {
        text.to_string()
    } else {
        match Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))) {
            Ok(pattern) => pattern.replace_all(text, "").into_owned(),
            Err(_) => text.to_string(),
        }
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
