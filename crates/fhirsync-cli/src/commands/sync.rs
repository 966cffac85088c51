use std::path::Path;
use std::sync::Arc;

use fhirsync_core::sync::{
    AcceptLocalConflictResolver, AcceptRemoteConflictResolver, ConflictResolver, HttpDataSource,
    SyncJobStatus, SyncOperation, SyncResult, Synchronizer,
};
use tokio::sync::{mpsc, watch};

use crate::cli::{ResolveStrategy, SyncArgs};
use crate::commands::common::{format_sync_error_lines, open_store};
use crate::config::load_sync_config;
use crate::error::CliError;

const STATUS_BUFFER: usize = 64;

pub fn resolver_for(strategy: ResolveStrategy) -> Arc<dyn ConflictResolver> {
    match strategy {
        ResolveStrategy::Local => Arc::new(AcceptLocalConflictResolver),
        ResolveStrategy::Remote => Arc::new(AcceptRemoteConflictResolver),
    }
}

pub fn format_status(status: &SyncJobStatus) -> Option<String> {
    match status {
        SyncJobStatus::Started => Some("Sync started".to_string()),
        SyncJobStatus::InProgress {
            operation,
            total,
            completed,
        } => {
            let operation = match operation {
                SyncOperation::Download => "Downloading",
                SyncOperation::Upload => "Uploading",
            };
            Some(format!("{operation}: {completed}/{total}"))
        }
        SyncJobStatus::Succeeded { .. } | SyncJobStatus::Failed { .. } => None,
    }
}

pub async fn run_sync(
    args: SyncArgs,
    config_path: &Path,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = load_sync_config(config_path)?;
    let store = open_store(db_path).await?;
    let data_source = Arc::new(HttpDataSource::new(&config)?);

    let (status_tx, mut status_rx) = mpsc::channel(STATUS_BUFFER);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let shutdown_rx = cancel_rx.clone();
    let synchronizer = Synchronizer::new(store, data_source, config, resolver_for(args.resolve))
        .with_status_sender(status_tx)
        .with_cancellation(cancel_rx);

    let printer = tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            if let Some(line) = format_status(&status) {
                eprintln!("{line}");
            }
        }
    });
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let result = if args.watch {
        // ctrl-c abandons the running pass and stops the schedule
        synchronizer
            .run_periodic(shutdown_rx)
            .await
            .map(|()| None)
    } else if args.upload_only {
        synchronizer.upload_only().await.map(Some)
    } else if args.download_only {
        synchronizer.download_only().await.map(Some)
    } else {
        synchronizer.synchronize().await.map(Some)
    };

    interrupt.abort();
    drop(synchronizer);
    let _ = printer.await;

    match result? {
        None => println!("Periodic sync stopped"),
        Some(SyncResult::Success { timestamp }) => println!("Sync completed at {timestamp}"),
        Some(SyncResult::Error(errors)) => {
            for line in format_sync_error_lines(&errors) {
                eprintln!("{line}");
            }
            return Err(CliError::SyncFailed(errors.len()));
        }
    }
    Ok(())
}
