use std::io::{self, Read};
use std::path::Path;

use fhirsync_core::{FhirStore, LocalChangeEntity, Resource, ResourceSyncError};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChangeListItem {
    pub id: i64,
    pub resource_type: String,
    pub resource_id: String,
    pub change_type: String,
    pub timestamp: String,
    pub payload: String,
}

pub async fn open_store(db_path: &Path) -> Result<FhirStore, CliError> {
    Ok(FhirStore::open_path(db_path).await?)
}

/// Read JSON text from a file path, or from stdin for `-`.
pub fn read_input(input: &str) -> Result<String, CliError> {
    let raw = if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(input)?
    };
    if raw.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(raw)
}

/// Parse one resource or a JSON array of resources.
pub fn parse_resources(raw: &str) -> Result<Vec<Resource>, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .map(Resource::from_value)
            .collect::<Result<Vec<_>, _>>()?),
        value => Ok(vec![Resource::from_value(value)?]),
    }
}

pub fn parse_single_resource(raw: &str) -> Result<Resource, CliError> {
    let mut resources = parse_resources(raw)?;
    if resources.len() != 1 {
        return Err(CliError::ExpectedSingleResource(resources.len()));
    }
    Ok(resources.remove(0))
}

pub fn change_to_list_item(change: &LocalChangeEntity) -> ChangeListItem {
    ChangeListItem {
        id: change.id,
        resource_type: change.resource_type.clone(),
        resource_id: change.resource_id.clone(),
        change_type: change.change_type.as_str().to_string(),
        timestamp: change.timestamp.clone(),
        payload: change.payload.clone(),
    }
}

pub fn format_change_lines(changes: &[LocalChangeEntity]) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            format!(
                "{:>5}  {:<6}  {}/{}  {}",
                change.id,
                change.change_type.as_str(),
                change.resource_type,
                change.resource_id,
                change.timestamp
            )
        })
        .collect()
}

pub fn format_sync_error_lines(errors: &[ResourceSyncError]) -> Vec<String> {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.resource_type, error.source))
        .collect()
}
