use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fhirsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No resource JSON provided")]
    EmptyInput,
    #[error("Expected a single resource, got {0}")]
    ExpectedSingleResource(usize),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sync finished with {0} error(s)")]
    SyncFailed(usize),
    #[error(
        "Sync is not configured. Create {0} or set FHIRSYNC_BASE_URL to enable `fhirsync sync`."
    )]
    SyncNotConfigured(String),
}
