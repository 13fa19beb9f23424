//! Credential manager
//!
//! Owns the OAuth lifecycle of each specialist's calendar connection:
//!
//! - issuing single-use state tokens and the consent URL
//! - validating the callback and exchanging the code for tokens
//! - handing out access tokens, refreshing them lazily shortly before they expire
//! - disconnecting
//!
//! Refresh is serialised per specialist. A caller that waited for another caller's refresh
//! re-reads the credential and uses the fresh token instead of refreshing again.

use crate::error::CredentialError;
use crate::locks::KeyedLocks;
use chrono::{DateTime, Duration, Utc};
use connectify_common::models::{Credential, CredentialStatus};
use connectify_common::{CalendarProvider, ProviderError};
use connectify_config::{GcalConfig, WorkerConfig};
use connectify_db::{CredentialRepository, SqlCredentialRepository};
use rand::RngCore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables of the credential manager.
#[derive(Debug, Clone)]
pub struct CredentialSettings {
    /// Tokens expiring within this window are refreshed before use.
    pub refresh_buffer: Duration,
    /// Pending authorizations older than this are invalid and purged.
    pub pending_ttl: Duration,
    pub default_calendar_id: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::minutes(5),
            pending_ttl: Duration::hours(1),
            default_calendar_id: "primary".to_string(),
        }
    }
}

impl CredentialSettings {
    pub fn from_config(gcal: &GcalConfig, worker: &WorkerConfig) -> Self {
        Self {
            refresh_buffer: Duration::seconds(worker.refresh_buffer_secs),
            pending_ttl: Duration::seconds(worker.pending_auth_ttl_secs),
            default_calendar_id: gcal.default_calendar_id.clone(),
        }
    }
}

/// A usable access token and the calendar it is meant for.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub calendar_id: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("calendar_id", &self.calendar_id)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Connection state of a specialist, without secrets.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub specialist_id: i64,
    /// `None` if the specialist never started an authorization.
    pub status: Option<CredentialStatus>,
    pub connected: bool,
    pub authorization_pending: bool,
    pub calendar_id: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub expires_at: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Credential manager
pub struct CredentialManager {
    credentials: SqlCredentialRepository,
    provider: Arc<dyn CalendarProvider>,
    refresh_locks: KeyedLocks,
    settings: CredentialSettings,
}

impl CredentialManager {
    pub fn new(
        credentials: SqlCredentialRepository,
        provider: Arc<dyn CalendarProvider>,
        settings: CredentialSettings,
    ) -> Self {
        Self {
            credentials,
            provider,
            refresh_locks: KeyedLocks::new(),
            settings,
        }
    }

    /// Start an authorization attempt and return the consent URL.
    ///
    /// A stale pending attempt is purged first. The new state token replaces any earlier one,
    /// so only the most recent consent URL can complete.
    pub async fn begin_authorization(&self, specialist_id: i64) -> Result<String, CredentialError> {
        let now = Utc::now();
        self.credentials
            .purge_stale_pending(specialist_id, now - self.settings.pending_ttl)
            .await?;

        let state = generate_state();
        self.credentials
            .start_pending(
                specialist_id,
                &state,
                &self.settings.default_calendar_id,
                now,
            )
            .await?;

        let url = self.provider.authorization_url(&state)?;
        info!("Started calendar authorization for specialist {}", specialist_id);
        Ok(format!("{}&cache_bust={}", url, now.timestamp()))
    }

    /// Complete an authorization for a known specialist.
    ///
    /// # Errors
    ///
    /// * [`CredentialError::StateMismatch`] if `returned_state` is not the specialist's live
    ///   pending state (wrong, already used, or older than the pending timeout)
    /// * [`CredentialError::Provider`] if the code exchange fails
    pub async fn complete_authorization(
        &self,
        specialist_id: i64,
        returned_state: &str,
        code: &str,
    ) -> Result<Credential, CredentialError> {
        let now = Utc::now();
        let pending = self
            .credentials
            .find_by_specialist(specialist_id)
            .await?
            .filter(|c| c.status == CredentialStatus::Pending)
            .filter(|c| c.oauth_state.as_deref() == Some(returned_state))
            .ok_or(CredentialError::StateMismatch)?;

        if pending.updated_at < now - self.settings.pending_ttl {
            warn!(
                "Authorization for specialist {} arrived after the pending timeout",
                specialist_id
            );
            return Err(CredentialError::StateMismatch);
        }

        let grant = self.provider.exchange_code(code).await?;
        let expires_at = now + Duration::seconds(grant.expires_in);

        let activated = self
            .credentials
            .activate(
                specialist_id,
                returned_state,
                &grant.access_token,
                grant.refresh_token.as_deref(),
                expires_at,
                now,
            )
            .await?;
        if !activated {
            // Another callback redeemed the state first
            return Err(CredentialError::StateMismatch);
        }

        let credential = self
            .credentials
            .find_by_specialist(specialist_id)
            .await?
            .ok_or(CredentialError::NotConnected(specialist_id))?;
        if credential.refresh_token.is_none() {
            warn!(
                "Specialist {} connected without a refresh token; access ends at {}",
                specialist_id, expires_at
            );
        }
        info!("Calendar connected for specialist {}", specialist_id);
        Ok(credential)
    }

    /// Complete an authorization where only the returned state identifies the specialist.
    pub async fn complete_authorization_by_state(
        &self,
        returned_state: &str,
        code: &str,
    ) -> Result<Credential, CredentialError> {
        let pending = self
            .credentials
            .find_by_oauth_state(returned_state)
            .await?
            .ok_or(CredentialError::StateMismatch)?;
        self.complete_authorization(pending.specialist_id, returned_state, code)
            .await
    }

    /// Return an access token that stays valid for at least the refresh buffer.
    ///
    /// # Errors
    ///
    /// * [`CredentialError::NotConnected`] without an active credential
    /// * [`CredentialError::CredentialRevoked`] if the provider rejects the refresh token;
    ///   the credential is disabled
    /// * [`CredentialError::Provider`] for transient refresh failures
    pub async fn get_valid_access_token(
        &self,
        specialist_id: i64,
    ) -> Result<AccessToken, CredentialError> {
        let credential = self.active_credential(specialist_id).await?;
        if !credential.needs_refresh(Utc::now(), self.settings.refresh_buffer) {
            return self.to_access_token(credential);
        }

        let _guard = self.refresh_locks.lock(specialist_id).await;

        // A concurrent caller may have refreshed while we waited
        let credential = self.active_credential(specialist_id).await?;
        if !credential.needs_refresh(Utc::now(), self.settings.refresh_buffer) {
            debug!("Using token refreshed concurrently for specialist {}", specialist_id);
            return self.to_access_token(credential);
        }

        let refresh_token = match credential.refresh_token.as_deref() {
            Some(token) => token.to_string(),
            None => {
                warn!(
                    "Specialist {} has an expiring token and no refresh token",
                    specialist_id
                );
                self.credentials.disable(specialist_id, Utc::now()).await?;
                return Err(CredentialError::CredentialRevoked(specialist_id));
            }
        };

        match self.provider.refresh_token(&refresh_token).await {
            Ok(grant) => {
                let now = Utc::now();
                let expires_at = now + Duration::seconds(grant.expires_in);
                let stored = self
                    .credentials
                    .store_refreshed_token(
                        specialist_id,
                        &grant.access_token,
                        grant.refresh_token.as_deref(),
                        expires_at,
                        now,
                    )
                    .await?;
                if !stored {
                    return Err(CredentialError::NotConnected(specialist_id));
                }
                info!("Refreshed access token for specialist {}", specialist_id);
                Ok(AccessToken {
                    token: grant.access_token,
                    calendar_id: self.calendar_id_of(&credential),
                    expires_at,
                })
            }
            Err(ProviderError::Auth(message)) => {
                warn!(
                    "Refresh token of specialist {} was rejected ({}); disabling credential",
                    specialist_id, message
                );
                self.credentials.disable(specialist_id, Utc::now()).await?;
                Err(CredentialError::CredentialRevoked(specialist_id))
            }
            Err(err) => {
                warn!("Token refresh for specialist {} failed: {}", specialist_id, err);
                Err(CredentialError::Provider(err))
            }
        }
    }

    /// Clear the specialist's tokens and disable the credential. Safe to repeat.
    pub async fn disconnect(&self, specialist_id: i64) -> Result<(), CredentialError> {
        if self.credentials.disable(specialist_id, Utc::now()).await? {
            info!("Calendar disconnected for specialist {}", specialist_id);
        } else {
            debug!("Specialist {} had no credential to disconnect", specialist_id);
        }
        Ok(())
    }

    pub async fn status(&self, specialist_id: i64) -> Result<ConnectionStatus, CredentialError> {
        let credential = self.credentials.find_by_specialist(specialist_id).await?;
        Ok(match credential {
            Some(c) => ConnectionStatus {
                specialist_id,
                status: Some(c.status),
                connected: c.status == CredentialStatus::Active,
                authorization_pending: c.status == CredentialStatus::Pending,
                calendar_id: c.calendar_id,
                expires_at: c.expires_at,
                updated_at: Some(c.updated_at),
            },
            None => ConnectionStatus {
                specialist_id,
                status: None,
                connected: false,
                authorization_pending: false,
                calendar_id: None,
                expires_at: None,
                updated_at: None,
            },
        })
    }

    /// Whether the specialist has an active credential.
    pub async fn is_connected(&self, specialist_id: i64) -> Result<bool, CredentialError> {
        Ok(self
            .credentials
            .find_by_specialist(specialist_id)
            .await?
            .is_some_and(|c| c.status == CredentialStatus::Active))
    }

    pub async fn connected_count(&self) -> Result<i64, CredentialError> {
        Ok(self.credentials.count_active().await?)
    }

    async fn active_credential(&self, specialist_id: i64) -> Result<Credential, CredentialError> {
        self.credentials
            .find_by_specialist(specialist_id)
            .await?
            .filter(|c| c.status == CredentialStatus::Active)
            .ok_or(CredentialError::NotConnected(specialist_id))
    }

    fn to_access_token(&self, credential: Credential) -> Result<AccessToken, CredentialError> {
        let calendar_id = self.calendar_id_of(&credential);
        match (credential.access_token, credential.expires_at) {
            (Some(token), Some(expires_at)) => Ok(AccessToken {
                token,
                calendar_id,
                expires_at,
            }),
            _ => Err(CredentialError::NotConnected(credential.specialist_id)),
        }
    }

    fn calendar_id_of(&self, credential: &Credential) -> String {
        credential
            .calendar_id
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.settings.default_calendar_id.clone())
    }
}

/// 16 random bytes, hex encoded.
fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
