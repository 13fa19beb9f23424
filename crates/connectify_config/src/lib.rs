// --- File: crates/connectify_config/src/lib.rs ---
//! Layered configuration for the Connectify calendar sync services.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. `config/default.{toml,json,yaml}`
//! 2. `config/{RUN_ENV}.{toml,json,yaml}` (`RUN_ENV` defaults to `debug`)
//! 3. Environment variables with the `PREFIX` prefix (default `HTR`) and `__` as the
//!    nesting separator, e.g. `HTR__GCAL__CLIENT_SECRET`.
//!
//! A `.env` file is loaded once before the sources are read.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

pub mod models;
pub use models::*;

/// Default prefix for configuration environment variables.
pub const DEFAULT_PREFIX: &str = "HTR";

/// Separator for nested keys in environment variables.
pub const CONFIG_SEPARATOR: &str = "__";

static INIT_DOTENV: OnceCell<()> = OnceCell::new();

/// Loads the application configuration from the directory named by `CONFIG_DIR`,
/// falling back to `./config`.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    ensure_dotenv_loaded();
    let config_dir = env::var("CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));
    load_config_from(&config_dir)
}

/// Loads the application configuration from an explicit directory.
///
/// Missing files are not an error; every section has defaults except the optional
/// `database` and `gcal` sections, which stay `None` when absent.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "debug".to_string());
    let prefix = env::var("PREFIX").unwrap_or_else(|_| DEFAULT_PREFIX.to_string());

    let default_path = config_dir.join("default");
    let env_path = config_dir.join(&run_env);
    debug!(
        "Loading config from {} and {} (prefix {})",
        default_path.display(),
        env_path.display(),
        prefix
    );

    let builder = Config::builder()
        .add_source(File::from(default_path).required(false))
        .add_source(File::from(env_path).required(false))
        .add_source(Environment::with_prefix(&prefix).separator(CONFIG_SEPARATOR));

    builder.build()?.try_deserialize()
}

/// Ensures that the dotenv file is loaded into the environment exactly once.
///
/// The path is taken from `DOTENV_OVERRIDE`, else from the first command line argument
/// when it starts with `.env`, else `.env`. Returns the path that was used.
pub fn ensure_dotenv_loaded() -> String {
    let dotenv_path_override = env::var("DOTENV_OVERRIDE").ok();
    let dotenv_path_arg = env::args().nth(1).filter(|s| s.starts_with(".env"));

    let dotenv_path = dotenv_path_override
        .or(dotenv_path_arg)
        .unwrap_or_else(|| ".env".to_string());

    INIT_DOTENV.get_or_init(|| {
        dotenv::from_filename(&dotenv_path).ok();
    });

    dotenv_path
}
