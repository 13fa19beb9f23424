//! SQL implementation of the credential repository

use crate::error::DbError;
use crate::repositories::credential::{Credential, CredentialRepository, CredentialStatus};
use crate::repositories::{from_timestamp, from_timestamp_opt, to_timestamp};
use crate::DbClient;
use chrono::{DateTime, Utc};
use connectify_common::models::CredentialEvent;
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::{debug, error, info, warn};

const CREDENTIAL_COLUMNS: &str = "specialist_id, status, oauth_state, access_token, refresh_token, \
     expires_at, calendar_id, created_at, updated_at";

/// SQL implementation of the credential repository
#[derive(Debug, Clone)]
pub struct SqlCredentialRepository {
    db_client: DbClient,
}

/// Target status of `event` applied to any of `from`, or an error if the lifecycle forbids it.
fn transition(from: &[CredentialStatus], event: CredentialEvent) -> Result<CredentialStatus, DbError> {
    let mut target = None;
    for status in from {
        let next = status.next(event).ok_or_else(|| {
            DbError::InvalidTransition(format!("{:?} is not allowed from {}", event, status))
        })?;
        target = Some(next);
    }
    target.ok_or_else(|| DbError::InvalidTransition(format!("{:?} without a source status", event)))
}

impl SqlCredentialRepository {
    pub fn new(db_client: DbClient) -> Self {
        Self { db_client }
    }

    fn map_row(row: &AnyRow) -> Result<Credential, DbError> {
        let specialist_id: i64 = row
            .try_get("specialist_id")
            .map_err(|e| DbError::DecodeError(e.to_string()))?;
        let status_raw: String = row
            .try_get("status")
            .map_err(|e| DbError::DecodeError(e.to_string()))?;
        let status = status_raw.parse::<CredentialStatus>().unwrap_or_else(|err| {
            warn!(
                "Credential for specialist {} has {}; treating it as disabled",
                specialist_id, err
            );
            CredentialStatus::Disabled
        });

        Ok(Credential {
            specialist_id,
            status,
            oauth_state: row.try_get("oauth_state").unwrap_or_default(),
            access_token: row.try_get("access_token").unwrap_or_default(),
            refresh_token: row.try_get("refresh_token").unwrap_or_default(),
            expires_at: from_timestamp_opt(row.try_get("expires_at").unwrap_or_default()),
            calendar_id: row.try_get("calendar_id").unwrap_or_default(),
            created_at: from_timestamp(row.try_get("created_at").unwrap_or_default()),
            updated_at: from_timestamp(row.try_get("updated_at").unwrap_or_default()),
        })
    }
}

impl CredentialRepository for SqlCredentialRepository {
    async fn init_schema(&self) -> Result<(), DbError> {
        debug!("Initializing credential schema");

        let query = r#"
            CREATE TABLE IF NOT EXISTS gcal_credentials (
                specialist_id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                oauth_state TEXT,
                access_token TEXT,
                refresh_token TEXT,
                expires_at INTEGER,
                calendar_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#;
        self.db_client.execute(query).await?;

        self.db_client
            .execute(
                "CREATE INDEX IF NOT EXISTS ix_gcal_credentials_state ON gcal_credentials (oauth_state)",
            )
            .await?;

        info!("Credential schema initialized successfully");
        Ok(())
    }

    async fn find_by_specialist(&self, specialist_id: i64) -> Result<Option<Credential>, DbError> {
        debug!("Finding credential for specialist: {}", specialist_id);

        let query = format!(
            "SELECT {} FROM gcal_credentials WHERE specialist_id = $1",
            CREDENTIAL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(specialist_id)
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find credential: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_oauth_state(&self, oauth_state: &str) -> Result<Option<Credential>, DbError> {
        debug!("Finding pending credential by OAuth state");

        let query = format!(
            "SELECT {} FROM gcal_credentials WHERE oauth_state = $1 AND status = $2",
            CREDENTIAL_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(oauth_state)
            .bind(CredentialStatus::Pending.as_str())
            .fetch_optional(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to find credential by state: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn purge_stale_pending(
        &self,
        specialist_id: i64,
        older_than: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM gcal_credentials WHERE specialist_id = $1 AND status = $2 AND updated_at < $3",
        )
        .bind(specialist_id)
        .bind(CredentialStatus::Pending.as_str())
        .bind(to_timestamp(older_than))
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to purge stale pending credential: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        if result.rows_affected() > 0 {
            info!(
                "Purged stale pending authorization for specialist {}",
                specialist_id
            );
        }
        Ok(result.rows_affected())
    }

    async fn start_pending(
        &self,
        specialist_id: i64,
        oauth_state: &str,
        calendar_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, DbError> {
        debug!("Starting pending authorization for specialist: {}", specialist_id);
        let pending = transition(&CredentialStatus::all(), CredentialEvent::BeginAuthorization)?;

        let query = format!(
            r#"
            INSERT INTO gcal_credentials (specialist_id, status, oauth_state, calendar_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (specialist_id) DO UPDATE SET
                status = excluded.status,
                oauth_state = excluded.oauth_state,
                calendar_id = COALESCE(gcal_credentials.calendar_id, excluded.calendar_id),
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            CREDENTIAL_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(specialist_id)
            .bind(pending.as_str())
            .bind(oauth_state)
            .bind(calendar_id)
            .bind(to_timestamp(now))
            .bind(to_timestamp(now))
            .fetch_one(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to upsert pending credential: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        Self::map_row(&row)
    }

    async fn activate(
        &self,
        specialist_id: i64,
        oauth_state: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let active = transition(&[CredentialStatus::Pending], CredentialEvent::Authorize)?;
        let result = sqlx::query(
            r#"
            UPDATE gcal_credentials SET
                status = $1,
                access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                expires_at = $4,
                oauth_state = NULL,
                updated_at = $5
            WHERE specialist_id = $6 AND status = $7 AND oauth_state = $8
            "#,
        )
        .bind(active.as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(to_timestamp(expires_at))
        .bind(to_timestamp(now))
        .bind(specialist_id)
        .bind(CredentialStatus::Pending.as_str())
        .bind(oauth_state)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to activate credential: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn store_refreshed_token(
        &self,
        specialist_id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let active = transition(&[CredentialStatus::Active], CredentialEvent::Refresh)?;
        let result = sqlx::query(
            r#"
            UPDATE gcal_credentials SET
                status = $1,
                access_token = $2,
                refresh_token = COALESCE($3, refresh_token),
                expires_at = $4,
                updated_at = $5
            WHERE specialist_id = $6 AND status = $7
            "#,
        )
        .bind(active.as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(to_timestamp(expires_at))
        .bind(to_timestamp(now))
        .bind(specialist_id)
        .bind(CredentialStatus::Active.as_str())
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to store refreshed token: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn disable(&self, specialist_id: i64, now: DateTime<Utc>) -> Result<bool, DbError> {
        let disabled = transition(&CredentialStatus::all(), CredentialEvent::Disable)?;
        let result = sqlx::query(
            r#"
            UPDATE gcal_credentials SET
                status = $1,
                access_token = NULL,
                refresh_token = NULL,
                expires_at = NULL,
                oauth_state = NULL,
                updated_at = $2
            WHERE specialist_id = $3
            "#,
        )
        .bind(disabled.as_str())
        .bind(to_timestamp(now))
        .bind(specialist_id)
        .execute(self.db_client.pool())
        .await
        .map_err(|e| {
            error!("Failed to disable credential: {}", e);
            DbError::QueryError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_active(&self) -> Result<i64, DbError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM gcal_credentials WHERE status = $1")
            .bind(CredentialStatus::Active.as_str())
            .fetch_one(self.db_client.pool())
            .await
            .map_err(|e| {
                error!("Failed to count active credentials: {}", e);
                DbError::QueryError(e.to_string())
            })?;

        row.try_get("count")
            .map_err(|e| DbError::DecodeError(e.to_string()))
    }
}
