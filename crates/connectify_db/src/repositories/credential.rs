//! Repository for calendar credentials
//!
//! One row per specialist holds the OAuth state of an in-flight authorization and, once
//! connected, the tokens used to reach the remote calendar.

use crate::error::DbError;
use chrono::{DateTime, Utc};

pub use connectify_common::models::{Credential, CredentialStatus};

/// Repository for calendar credentials
pub trait CredentialRepository {
    /// Create the `gcal_credentials` table if it does not exist yet
    fn init_schema(&self) -> impl std::future::Future<Output = Result<(), DbError>> + Send;

    /// Find the credential of a specialist, whatever its status
    fn find_by_specialist(
        &self,
        specialist_id: i64,
    ) -> impl std::future::Future<Output = Result<Option<Credential>, DbError>> + Send;

    /// Find the pending credential bound to an OAuth state token
    fn find_by_oauth_state(
        &self,
        oauth_state: &str,
    ) -> impl std::future::Future<Output = Result<Option<Credential>, DbError>> + Send;

    /// Delete the specialist's `pending` record if it was last touched before `older_than`
    ///
    /// # Returns
    ///
    /// The number of purged rows (0 or 1)
    fn purge_stale_pending(
        &self,
        specialist_id: i64,
        older_than: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, DbError>> + Send;

    /// Insert or update the specialist's row as `pending`, bound to `oauth_state`
    ///
    /// Any previous state token is overwritten, so at most one authorization attempt per
    /// specialist is outstanding. Stored tokens stay in place but are unusable until the
    /// flow completes.
    fn start_pending(
        &self,
        specialist_id: i64,
        oauth_state: &str,
        calendar_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Credential, DbError>> + Send;

    /// Move a pending credential to `active` and consume its state token
    ///
    /// The update only applies while the row is still pending with the given state, so a
    /// state token can be redeemed once. A missing `refresh_token` keeps the stored one.
    ///
    /// # Returns
    ///
    /// `true` if the credential was activated
    fn activate(
        &self,
        specialist_id: i64,
        oauth_state: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    /// Store a refreshed access token on an active credential
    ///
    /// # Returns
    ///
    /// `true` if an active credential was updated
    fn store_refreshed_token(
        &self,
        specialist_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    /// Clear all secrets and set the status to `disabled`
    ///
    /// # Returns
    ///
    /// `true` if a row existed
    fn disable(
        &self,
        specialist_id: i64,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool, DbError>> + Send;

    /// Number of specialists with an active credential
    fn count_active(&self) -> impl std::future::Future<Output = Result<i64, DbError>> + Send;
}
