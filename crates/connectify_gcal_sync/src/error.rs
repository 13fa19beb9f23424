//! Error types of the sync engine
//!
//! Each layer has its own enum. [`SyncError`] is what the worker sees for a queue item and
//! [`SyncError::is_retryable`] decides whether the item goes back to `pending`.

use chrono::NaiveDateTime;
use connectify_common::{ConnectifyError, ProviderError};
use connectify_db::DbError;
use thiserror::Error;

/// Failures of the credential manager.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No active credential exists for the specialist.
    #[error("Specialist {0} has no active calendar connection")]
    NotConnected(i64),

    /// The returned state does not belong to a live pending authorization.
    #[error("Authorization state does not match a pending request")]
    StateMismatch,

    /// The provider rejected the stored refresh token; the credential is now disabled.
    #[error("Calendar access for specialist {0} was revoked, reconnect required")]
    CredentialRevoked(i64),

    /// The specialist declined consent or the provider reported an error on the callback.
    #[error("Authorization was not granted: {0}")]
    AuthorizationDenied(String),

    /// Token exchange or refresh failed for a reason other than revocation.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Credential storage error: {0}")]
    Storage(#[from] DbError),
}

/// Failures building an event body from a booking.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("Booking {booking_id} ends at or before it starts")]
    InvalidRange { booking_id: i64 },

    #[error("Local time {local} does not exist in {zone}")]
    NonexistentLocalTime { local: NaiveDateTime, zone: String },

    #[error("Booking {0} not found")]
    BookingNotFound(i64),
}

/// Failures reconciling one booking with its remote event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Booking {0} not found")]
    BookingNotFound(i64),

    #[error("Booking storage error: {0}")]
    Storage(#[from] DbError),
}

/// Failure of one unit of sync work.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// A provider call outside event reconciliation, such as listing events.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

impl SyncError {
    /// Whether the same work may succeed when attempted again later.
    ///
    /// Rate limits, transient provider failures (timeouts included) and storage errors are
    /// retryable. Authorization problems, invalid payloads and missing remote events are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Credential(CredentialError::Provider(e)) => e.is_retryable(),
            SyncError::Credential(CredentialError::Storage(_)) => true,
            SyncError::Credential(_) => false,
            SyncError::Payload(_) => false,
            SyncError::Reconcile(ReconcileError::Provider(e)) => e.is_retryable(),
            SyncError::Reconcile(ReconcileError::BookingNotFound(_)) => false,
            SyncError::Reconcile(ReconcileError::Storage(_)) => true,
            SyncError::Provider(e) => e.is_retryable(),
            SyncError::Storage(_) => true,
        }
    }
}

impl From<CredentialError> for ConnectifyError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotConnected(_) => ConnectifyError::ConflictError(err.to_string()),
            CredentialError::StateMismatch | CredentialError::AuthorizationDenied(_) => {
                ConnectifyError::ValidationError(err.to_string())
            }
            CredentialError::CredentialRevoked(_) => ConnectifyError::AuthError(err.to_string()),
            CredentialError::Provider(e) => e.into(),
            CredentialError::Storage(e) => ConnectifyError::DatabaseError(e.to_string()),
        }
    }
}

impl From<PayloadError> for ConnectifyError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::BookingNotFound(_) => ConnectifyError::NotFoundError(err.to_string()),
            _ => ConnectifyError::ValidationError(err.to_string()),
        }
    }
}

impl From<ReconcileError> for ConnectifyError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Provider(e) => e.into(),
            ReconcileError::BookingNotFound(_) => ConnectifyError::NotFoundError(err.to_string()),
            ReconcileError::Storage(e) => ConnectifyError::DatabaseError(e.to_string()),
        }
    }
}

impl From<SyncError> for ConnectifyError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Credential(e) => e.into(),
            SyncError::Payload(e) => e.into(),
            SyncError::Reconcile(e) => e.into(),
            SyncError::Provider(e) => e.into(),
            SyncError::Storage(e) => ConnectifyError::DatabaseError(e.to_string()),
        }
    }
}
