// --- File: crates/connectify_common/src/models.rs ---

// Data structures shared by the database layer, the sync engine and the HTTP surface.
// Status fields are closed enums; the database stores their lowercase names.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format used to store booking wall-clock times.
pub const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error returned when a stored status string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Lifecycle of a specialist's calendar credential.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    /// An authorization flow is outstanding.
    Pending,
    /// Tokens have been issued and may be used.
    Active,
    /// Revoked, disconnected or superseded.
    Disabled,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Pending => "pending",
            CredentialStatus::Active => "active",
            CredentialStatus::Disabled => "disabled",
        }
    }

    pub fn all() -> [CredentialStatus; 3] {
        [
            CredentialStatus::Pending,
            CredentialStatus::Active,
            CredentialStatus::Disabled,
        ]
    }

    /// The closed transition function of a credential.
    ///
    /// A flow may be (re)started and a credential disabled from any state. Only a pending
    /// flow can be authorized and only an active credential refreshed.
    pub fn next(self, event: CredentialEvent) -> Option<CredentialStatus> {
        match (self, event) {
            (_, CredentialEvent::BeginAuthorization) => Some(CredentialStatus::Pending),
            (CredentialStatus::Pending, CredentialEvent::Authorize) => {
                Some(CredentialStatus::Active)
            }
            (CredentialStatus::Active, CredentialEvent::Refresh) => Some(CredentialStatus::Active),
            (_, CredentialEvent::Disable) => Some(CredentialStatus::Disabled),
            _ => None,
        }
    }
}

/// Events that move a credential through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A new consent flow was started.
    BeginAuthorization,
    /// The provider issued tokens for the pending flow.
    Authorize,
    /// The access token was renewed.
    Refresh,
    /// The specialist disconnected or the provider revoked access.
    Disable,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CredentialStatus::Pending),
            "active" => Ok(CredentialStatus::Active),
            "disabled" => Ok(CredentialStatus::Disabled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// OAuth artifacts for one specialist.
///
/// Secrets are never serialized.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub specialist_id: i64,
    pub status: CredentialStatus,
    #[serde(skip_serializing)]
    pub oauth_state: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub calendar_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// True when the access token is missing or expires within `buffer` of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: chrono::Duration) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(expires_at)) => expires_at <= now + buffer,
            _ => true,
        }
    }
}

/// The change a queue item mirrors to the remote calendar.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" | "created" => Ok(SyncAction::Create),
            "update" | "updated" => Ok(SyncAction::Update),
            "delete" | "deleted" => Ok(SyncAction::Delete),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// State of a sync queue item.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Events that move a queue item through its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// A worker took ownership of the item.
    Claim,
    /// The remote calendar reflects the change.
    Succeed,
    /// A retryable failure with attempts left, or a change arrived while processing.
    Retry,
    /// A non-retryable failure or exhausted attempts.
    Fail,
    /// The owning worker stopped making progress.
    Reap,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Processing => "processing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }

    /// The closed transition function of the queue.
    ///
    /// Returns `None` for every transition the queue does not allow, in particular
    /// anything leaving a terminal state.
    pub fn next(self, event: QueueEvent) -> Option<SyncStatus> {
        match (self, event) {
            (SyncStatus::Pending, QueueEvent::Claim) => Some(SyncStatus::Processing),
            (SyncStatus::Processing, QueueEvent::Succeed) => Some(SyncStatus::Completed),
            (SyncStatus::Processing, QueueEvent::Retry) => Some(SyncStatus::Pending),
            (SyncStatus::Processing, QueueEvent::Reap) => Some(SyncStatus::Pending),
            (SyncStatus::Processing, QueueEvent::Fail) => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    pub fn all() -> [SyncStatus; 4] {
        [
            SyncStatus::Pending,
            SyncStatus::Processing,
            SyncStatus::Completed,
            SyncStatus::Failed,
        ]
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "processing" => Ok(SyncStatus::Processing),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// One unit of synchronization work for one booking.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct SyncQueueItem {
    pub id: i64,
    pub booking_id: i64,
    pub specialist_id: i64,
    pub action: SyncAction,
    pub status: SyncStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    /// A superseding change arrived while this item was processing.
    pub requeue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_attempt_at: DateTime<Utc>,
}

/// Number of queue items per status.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Items completed since midnight UTC.
    pub completed_today: i64,
}

impl QueueStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// A booking as seen by the sync engine.
///
/// Start and end are wall-clock times at the workpoint; the workpoint country decides
/// the timezone they are interpreted in.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub specialist_id: i64,
    pub service_name: Option<String>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub start_local: NaiveDateTime,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub end_local: NaiveDateTime,
    pub workpoint_country: Option<String>,
    pub workpoint_address: Option<String>,
    /// Day the booking was made, as recorded by the booking store.
    pub created_on: Option<String>,
    /// Channel the booking came through (web, phone, ...).
    pub received_through: Option<String>,
    pub cancelled: bool,
    /// Identifier of the mirrored remote event, once created.
    pub remote_event_id: Option<String>,
}

/// Booking fields supplied when inserting into the booking store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub specialist_id: i64,
    pub service_name: Option<String>,
    pub client_name: Option<String>,
    pub client_phone: Option<String>,
    pub start_local: NaiveDateTime,
    pub end_local: NaiveDateTime,
    pub workpoint_country: Option<String>,
    pub workpoint_address: Option<String>,
    pub created_on: Option<String>,
    pub received_through: Option<String>,
    /// Set when the booking is created from an existing remote event.
    #[serde(default)]
    pub remote_event_id: Option<String>,
}
