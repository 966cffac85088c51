//! CLI configuration: sync config file, environment overrides and paths.

use std::env;
use std::path::{Path, PathBuf};

use fhirsync_core::config::SyncConfig;
use fhirsync_core::util::normalize_text_option;
use serde_json::{Map, Value};

use crate::error::CliError;

const APP_DIR: &str = "fhirsync";
const CONFIG_FILE_NAME: &str = "config.json";
const DB_FILE_NAME: &str = "fhirsync.db";

pub const BASE_URL_ENV: &str = "FHIRSYNC_BASE_URL";
pub const AUTH_TOKEN_ENV: &str = "FHIRSYNC_AUTH_TOKEN";
pub const DB_PATH_ENV: &str = "FHIRSYNC_DB_PATH";

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE_NAME)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(DB_FILE_NAME)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path.unwrap_or_else(default_config_path)
}

fn env_text(name: &str) -> Option<String> {
    normalize_text_option(env::var(name).ok())
}

/// Load the sync config from `path`, applying environment overrides.
pub fn load_sync_config(path: &Path) -> Result<SyncConfig, CliError> {
    let raw = if path.exists() {
        Some(std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!("Failed to read config at {}: {error}", path.display()))
        })?)
    } else {
        None
    };
    resolve_sync_config(path, raw.as_deref(), env_text(BASE_URL_ENV), env_text(AUTH_TOKEN_ENV))
}

/// Merge the config file text with `FHIRSYNC_*` overrides and validate.
pub fn resolve_sync_config(
    path: &Path,
    raw: Option<&str>,
    base_url: Option<String>,
    auth_token: Option<String>,
) -> Result<SyncConfig, CliError> {
    let mut document = match raw {
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(CliError::Config(format!(
                    "Config at {} must be a JSON object",
                    path.display()
                )));
            }
            Err(error) => {
                return Err(CliError::Config(format!(
                    "Failed to parse config at {}: {error}",
                    path.display()
                )));
            }
        },
        None => Map::new(),
    };

    if let Some(base_url) = base_url {
        document.insert("base_url".into(), Value::String(base_url));
    }
    if let Some(auth_token) = auth_token {
        document.insert("auth_token".into(), Value::String(auth_token));
    }
    if !document.contains_key("base_url") {
        return Err(CliError::SyncNotConfigured(path.display().to_string()));
    }

    Ok(SyncConfig::from_json(&Value::Object(document).to_string())?)
}
