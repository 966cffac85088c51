use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "fhirsync")]
#[command(about = "Edit FHIR resources offline and sync them with a server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the sync config JSON file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create resources from a JSON file ("-" for stdin)
    Insert {
        /// A resource or an array of resources
        #[arg(value_name = "FILE|-")]
        input: String,
    },
    /// Replace a stored resource from a JSON file ("-" for stdin)
    Update {
        #[arg(value_name = "FILE|-")]
        input: String,
    },
    /// Print a stored resource
    Get {
        resource_type: String,
        id: String,
    },
    /// Delete a resource and record the deletion for upload
    Delete {
        resource_type: String,
        id: String,
    },
    /// Remove a resource locally without uploading anything
    Purge {
        resource_type: String,
        id: String,
        /// Also drop pending local changes
        #[arg(long)]
        force: bool,
    },
    /// List pending local changes
    Changes {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download remote changes and upload local ones
    Sync(SyncArgs),
    /// Inspect CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct SyncArgs {
    /// Only upload local changes
    #[arg(long, conflicts_with = "download_only")]
    pub upload_only: bool,
    /// Only download remote changes
    #[arg(long)]
    pub download_only: bool,
    /// Keep syncing on the configured interval until interrupted
    #[arg(long, conflicts_with_all = ["upload_only", "download_only"])]
    pub watch: bool,
    /// Which side wins when a download conflicts with local changes
    #[arg(long, value_enum, default_value_t = ResolveStrategy::Local)]
    pub resolve: ResolveStrategy,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ResolveStrategy {
    Local,
    Remote,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective sync configuration and paths
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
