// --- File: crates/connectify_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8086,
        }
    }
}

// --- Database Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String, // e.g. sqlite://data/connectify.db, overridable via HTR__DATABASE__URL
}

// --- Logging Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level applied to the connectify crates when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs are additionally written to a daily rolling file in this directory.
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// --- Google Calendar Sync Config ---
// Holds the OAuth client and API endpoints. The client secret is expected from the
// environment: HTR__GCAL__CLIENT_SECRET
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GcalConfig {
    pub client_id: String,
    #[serde(default, skip_serializing)]
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Timeout applied to every HTTP call to the provider.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_calendar_id")]
    pub default_calendar_id: String,
    /// Timezone used when a workpoint country cannot be resolved.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl GcalConfig {
    /// Config for an OAuth client with every endpoint at its default.
    pub fn with_client(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            scope: default_scope(),
            request_timeout_secs: default_request_timeout_secs(),
            default_calendar_id: default_calendar_id(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_scope() -> String {
    "https://www.googleapis.com/auth/calendar".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

// --- Queue Worker Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// Run the periodic queue worker inside the backend server.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_item_timeout_secs")]
    pub item_timeout_secs: u64,
    /// A processing item claimed longer ago than this is considered abandoned.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Base delay before a retried item becomes claimable again; doubled per attempt.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: i64,
    #[serde(default = "default_sync_all_limit")]
    pub sync_all_limit: u32,
    /// Tokens expiring within this window are refreshed before use.
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: i64,
    /// Pending authorization attempts older than this are purged.
    #[serde(default = "default_pending_auth_ttl_secs")]
    pub pending_auth_ttl_secs: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            item_timeout_secs: default_item_timeout_secs(),
            stale_after_secs: default_stale_after_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            retry_backoff_secs: default_retry_backoff_secs(),
            sync_all_limit: default_sync_all_limit(),
            refresh_buffer_secs: default_refresh_buffer_secs(),
            pending_auth_ttl_secs: default_pending_auth_ttl_secs(),
        }
    }
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    5
}

fn default_item_timeout_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> i64 {
    900
}

fn default_poll_interval_secs() -> u64 {
    120
}

fn default_retry_backoff_secs() -> i64 {
    30
}

fn default_sync_all_limit() -> u32 {
    500
}

fn default_refresh_buffer_secs() -> i64 {
    300
}

fn default_pending_auth_ttl_secs() -> i64 {
    3600
}

// --- Unified App Configuration ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    // --- Runtime Flags (optional in config file, default to false) ---
    #[serde(default)]
    pub use_gcal_sync: bool,

    // --- Optional Sections ---
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub gcal: Option<GcalConfig>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}
