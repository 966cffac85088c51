use std::path::Path;

use crate::commands::common::{open_store, parse_resources, parse_single_resource, read_input};
use crate::error::CliError;

pub async fn run_insert(input: &str, db_path: &Path) -> Result<(), CliError> {
    let resources = parse_resources(&read_input(input)?)?;
    let types: Vec<String> = resources
        .iter()
        .map(|resource| resource.resource_type().to_string())
        .collect();

    let store = open_store(db_path).await?;
    let ids = store.insert(resources).await?;
    for (resource_type, id) in types.iter().zip(&ids) {
        println!("{resource_type}/{id}");
    }
    Ok(())
}

pub async fn run_update(input: &str, db_path: &Path) -> Result<(), CliError> {
    let resource = parse_single_resource(&read_input(input)?)?;
    let key = resource.key()?;

    let store = open_store(db_path).await?;
    store.update(resource).await?;
    println!("{key}");
    Ok(())
}

pub async fn run_get(resource_type: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let resource = store.select(resource_type, id).await?;
    println!("{}", serde_json::to_string_pretty(resource.as_value())?);
    Ok(())
}

pub async fn run_delete(resource_type: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    store.delete(resource_type, id).await?;
    println!("{resource_type}/{id}");
    Ok(())
}

pub async fn run_purge(
    resource_type: &str,
    id: &str,
    force: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    store.purge(resource_type, id, force).await?;
    println!("Purged {resource_type}/{id}");
    Ok(())
}
