// --- File: crates/services/connectify_backend/src/app_state.rs ---
use connectify_common::{config_error, ConnectifyError};
use connectify_config::AppConfig;
use connectify_db::DbClient;
use connectify_gcal_sync::{GcalSyncService, GcalSyncState};
use std::sync::Arc;
use tracing::info;

/// Application state that is shared across all routes and the background worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_client: DbClient,
    pub gcal_sync: Arc<GcalSyncService>,
}

impl AppState {
    /// Connect to the database, build the sync service and make sure its tables exist.
    ///
    /// # Errors
    ///
    /// Fails if the `database` or `gcal` section is missing or unusable.
    pub async fn initialize(config: Arc<AppConfig>) -> Result<Self, ConnectifyError> {
        let db_client = DbClient::new(&config)
            .await
            .map_err(|e| config_error(format!("Database unavailable: {}", e)))?;
        let service = GcalSyncService::from_config(&config, db_client.clone())?;
        service
            .init_schema()
            .await
            .map_err(|e| ConnectifyError::DatabaseError(e.to_string()))?;
        info!("Calendar sync service ready");

        Ok(Self {
            config,
            db_client,
            gcal_sync: Arc::new(service),
        })
    }

    /// State handed to the calendar sync routes.
    pub fn gcal_sync_state(&self) -> Arc<GcalSyncState> {
        Arc::new(GcalSyncState {
            config: self.config.clone(),
            service: self.gcal_sync.clone(),
        })
    }
}
