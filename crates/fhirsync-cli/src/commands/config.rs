use std::path::Path;

use serde_json::{json, Value};

use crate::cli::ConfigCommands;
use crate::config::load_sync_config;
use crate::error::CliError;

pub fn run_config(
    command: &ConfigCommands,
    config_path: &Path,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show { json } => run_config_show(*json, config_path, db_path),
    }
}

fn run_config_show(as_json: bool, config_path: &Path, db_path: &Path) -> Result<(), CliError> {
    let sync = match load_sync_config(config_path) {
        Ok(config) => Some(redacted_config(&serde_json::to_value(&config)?)),
        Err(CliError::SyncNotConfigured(_)) => None,
        Err(error) => return Err(error),
    };

    if as_json {
        let document = json!({
            "config_path": config_path.display().to_string(),
            "db_path": db_path.display().to_string(),
            "sync": sync,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Config file: {}", config_path.display());
    println!("Database:    {}", db_path.display());
    match sync {
        Some(sync) => println!("{}", serde_json::to_string_pretty(&sync)?),
        None => println!("Sync is not configured."),
    }
    Ok(())
}

/// Serialized config with the auth token masked.
pub fn redacted_config(config: &Value) -> Value {
    let mut config = config.clone();
    if let Some(token) = config.get_mut("auth_token") {
        *token = Value::String("[REDACTED]".into());
    }
    config
}
