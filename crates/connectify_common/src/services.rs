// --- File: crates/connectify_common/src/services.rs ---
//! Service abstractions for external services.
//!
//! The remote calendar is reached only through [`CalendarProvider`], so the sync engine can
//! run against an in-memory double in tests and against the Google API in production.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Failure modes of the remote calendar provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The access or refresh token was rejected.
    #[error("Authorization rejected by provider: {0}")]
    Auth(String),

    /// The addressed remote event does not exist (any more).
    #[error("Remote event not found: {0}")]
    NotFound(String),

    /// The provider asked us to slow down.
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    /// Any other transport or server-side failure, including timeouts.
    #[error("Provider error (status {status:?}): {message}")]
    Provider { status: Option<u16>, message: String },

    /// The request body was rejected as malformed.
    #[error("Invalid event payload: {0}")]
    Payload(String),
}

impl ProviderError {
    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Provider { .. }
        )
    }

    pub fn provider<T: std::fmt::Display>(message: T) -> Self {
        ProviderError::Provider {
            status: None,
            message: message.to_string(),
        }
    }
}

/// Tokens returned by an authorization-code or refresh-token exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Providers usually omit this on refresh; the stored one stays valid then.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: i64,
}

/// Provider-agnostic calendar event built from a booking.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub title: String,
    pub description: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub start_utc: DateTime<Utc>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub end_utc: DateTime<Utc>,
    pub location: Option<String>,
    /// IANA zone the event is displayed in.
    pub time_zone: String,
}

/// Event read back from a remote calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: RemoteEventTime,
    pub end: RemoteEventTime,
}

/// Start or end of a [`RemoteEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEventTime {
    /// Timed event, with the offset the provider reported.
    At(DateTime<FixedOffset>),
    /// All-day event.
    Date(NaiveDate),
}

impl RemoteEventTime {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            RemoteEventTime::At(at) => Some(at.with_timezone(&Utc)),
            RemoteEventTime::Date(_) => None,
        }
    }
}

/// Capabilities the sync engine needs from a remote calendar.
pub trait CalendarProvider: Send + Sync {
    /// Build the consent URL a specialist is sent to, embedding `state`.
    fn authorization_url(&self, state: &str) -> Result<String, ProviderError>;

    /// Exchange an authorization code for tokens.
    fn exchange_code(&self, code: &str) -> BoxFuture<'_, TokenGrant, ProviderError>;

    /// Obtain a fresh access token.
    fn refresh_token(&self, refresh_token: &str) -> BoxFuture<'_, TokenGrant, ProviderError>;

    /// Create an event and return the provider-assigned identifier.
    fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError>;

    /// Replace an existing event and return its identifier.
    fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
        event: &EventPayload,
    ) -> BoxFuture<'_, String, ProviderError>;

    /// Delete an event.
    fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        event_id: &str,
    ) -> BoxFuture<'_, (), ProviderError>;

    /// List up to `max_results` events overlapping `[time_min, time_max)`, recurring events
    /// expanded into single instances and ordered by start time.
    fn list_events(
        &self,
        access_token: &str,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        max_results: u32,
    ) -> BoxFuture<'_, Vec<RemoteEvent>, ProviderError>;
}
