//! Event reconciler
//!
//! Decides between creating and updating the remote event of a booking and keeps the
//! booking's `remote_event_id` in line with the remote side. Calls for the same booking are
//! serialised, so the queue worker and the sync-all path never create two events for one
//! booking.

use crate::credentials::AccessToken;
use crate::error::ReconcileError;
use crate::locks::KeyedLocks;
use connectify_common::{CalendarProvider, EventPayload, ProviderError};
use connectify_db::{BookingRepository, SqlBookingRepository};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a reconciliation did on the remote side.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub remote_event_id: String,
}

/// Event reconciler
pub struct EventReconciler {
    bookings: SqlBookingRepository,
    provider: Arc<dyn CalendarProvider>,
    booking_locks: KeyedLocks,
}

impl EventReconciler {
    pub fn new(bookings: SqlBookingRepository, provider: Arc<dyn CalendarProvider>) -> Self {
        Self {
            bookings,
            provider,
            booking_locks: KeyedLocks::new(),
        }
    }

    /// Make the remote event of a booking match `payload`.
    ///
    /// Without a stored reference the event is created and its id persisted on the booking.
    /// With one it is updated. If the remote event vanished, the stale reference is cleared
    /// and the event is created once more.
    pub async fn create_or_update(
        &self,
        booking_id: i64,
        token: &AccessToken,
        payload: &EventPayload,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let _guard = self.booking_locks.lock(booking_id).await;

        let booking = self
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(ReconcileError::BookingNotFound(booking_id))?;

        if let Some(event_id) = booking.remote_event_id.as_deref() {
            match self
                .provider
                .update_event(&token.token, &token.calendar_id, event_id, payload)
                .await
            {
                Ok(remote_event_id) => {
                    if remote_event_id != event_id {
                        self.bookings
                            .set_remote_event_id(booking_id, Some(remote_event_id.as_str()))
                            .await?;
                    }
                    debug!("Updated remote event {} for booking {}", remote_event_id, booking_id);
                    return Ok(ReconcileOutcome {
                        action: ReconcileAction::Updated,
                        remote_event_id,
                    });
                }
                Err(ProviderError::NotFound(_)) => {
                    warn!(
                        "Remote event {} of booking {} no longer exists, recreating it",
                        event_id, booking_id
                    );
                    self.bookings.set_remote_event_id(booking_id, None).await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let remote_event_id = self
            .provider
            .create_event(&token.token, &token.calendar_id, payload)
            .await?;
        self.bookings
            .set_remote_event_id(booking_id, Some(remote_event_id.as_str()))
            .await?;
        info!("Created remote event {} for booking {}", remote_event_id, booking_id);

        Ok(ReconcileOutcome {
            action: ReconcileAction::Created,
            remote_event_id,
        })
    }

    /// Remove the remote event of a booking, if it has one.
    ///
    /// A remote event that is already gone counts as deleted. A booking that no longer
    /// exists has nothing left to delete.
    ///
    /// # Returns
    ///
    /// `true` if a remote reference existed
    pub async fn delete_remote(
        &self,
        booking_id: i64,
        token: &AccessToken,
    ) -> Result<bool, ReconcileError> {
        let _guard = self.booking_locks.lock(booking_id).await;

        let Some(booking) = self.bookings.find_by_id(booking_id).await? else {
            debug!("Booking {} is gone, nothing to delete remotely", booking_id);
            return Ok(false);
        };
        let Some(event_id) = booking.remote_event_id.as_deref() else {
            debug!("Booking {} has no remote event", booking_id);
            return Ok(false);
        };

        match self
            .provider
            .delete_event(&token.token, &token.calendar_id, event_id)
            .await
        {
            Ok(()) => info!("Deleted remote event {} of booking {}", event_id, booking_id),
            Err(ProviderError::NotFound(_)) => {
                debug!("Remote event {} was already deleted", event_id)
            }
            Err(err) => return Err(err.into()),
        }

        self.bookings.set_remote_event_id(booking_id, None).await?;
        Ok(true)
    }
}
