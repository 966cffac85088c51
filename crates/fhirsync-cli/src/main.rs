//! fhirsync CLI - edit FHIR resources offline and sync them with a server

mod cli;
mod commands;
mod config;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::changes::run_changes;
use crate::commands::config::run_config;
use crate::commands::resource::{run_delete, run_get, run_insert, run_purge, run_update};
use crate::commands::sync::run_sync;
use crate::config::{resolve_config_path, resolve_db_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "fhirsync=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);

    match cli.command {
        Commands::Insert { input } => run_insert(&input, &db_path).await?,
        Commands::Update { input } => run_update(&input, &db_path).await?,
        Commands::Get { resource_type, id } => run_get(&resource_type, &id, &db_path).await?,
        Commands::Delete { resource_type, id } => {
            run_delete(&resource_type, &id, &db_path).await?;
        }
        Commands::Purge {
            resource_type,
            id,
            force,
        } => run_purge(&resource_type, &id, force, &db_path).await?,
        Commands::Changes { json } => run_changes(json, &db_path).await?,
        Commands::Sync(args) => run_sync(args, &config_path, &db_path).await?,
        Commands::Config { command } => run_config(&command, &config_path, &db_path)?,
    }

    Ok(())
}
