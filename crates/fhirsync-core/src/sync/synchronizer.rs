//! Orchestrates download and upload passes

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::config::SyncConfig;
use crate::error::{Error, ResourceSyncError, Result};
use crate::services::FhirStore;
use crate::util::timestamp_now;

use super::conflict::ConflictResolver;
use super::data_source::DataSource;
use super::download::{Downloader, DownloadWorkManager, ResourceParamsDownloadWorkManager};
use super::fetcher::LocalChangeFetcher;
use super::uploader::Uploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Download,
    Upload,
}

/// Progress events emitted while a sync runs.
#[derive(Debug, Clone)]
pub enum SyncJobStatus {
    Started,
    InProgress {
        operation: SyncOperation,
        total: usize,
        completed: usize,
    },
    Succeeded {
        timestamp: String,
    },
    Failed {
        errors: Vec<ResourceSyncError>,
    },
}

#[derive(Debug, Clone)]
pub enum SyncResult {
    Success { timestamp: String },
    Error(Vec<ResourceSyncError>),
}

impl SyncResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Both,
    DownloadOnly,
    UploadOnly,
}

impl Direction {
    const fn downloads(self) -> bool {
        matches!(self, Self::Both | Self::DownloadOnly)
    }

    const fn uploads(self) -> bool {
        matches!(self, Self::Both | Self::UploadOnly)
    }
}

/// Runs sync passes against one store and one server.
///
/// A pass downloads first so conflicts are resolved before local changes go
/// out. Per-resource failures are collected into [`SyncResult::Error`]; `Err`
/// means the local database failed or the pass was cancelled.
pub struct Synchronizer {
    store: FhirStore,
    data_source: Arc<dyn DataSource>,
    config: SyncConfig,
    resolver: Arc<dyn ConflictResolver>,
    status: Option<mpsc::Sender<SyncJobStatus>>,
    cancel: Option<watch::Receiver<bool>>,
}

impl Synchronizer {
    pub fn new(
        store: FhirStore,
        data_source: Arc<dyn DataSource>,
        config: SyncConfig,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        Self {
            store,
            data_source,
            config,
            resolver,
            status: None,
            cancel: None,
        }
    }

    /// Send [`SyncJobStatus`] events to this channel.
    #[must_use]
    pub fn with_status_sender(mut self, sender: mpsc::Sender<SyncJobStatus>) -> Self {
        self.status = Some(sender);
        self
    }

    /// Abandon the running pass once this signal turns `true`.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Download, then upload.
    pub async fn synchronize(&self) -> Result<SyncResult> {
        self.run(Direction::Both).await
    }

    pub async fn upload_only(&self) -> Result<SyncResult> {
        self.run(Direction::UploadOnly).await
    }

    pub async fn download_only(&self) -> Result<SyncResult> {
        self.run(Direction::DownloadOnly).await
    }

    /// Repeat [`synchronize`](Self::synchronize) every configured interval
    /// until `shutdown` turns `true` or its sender is dropped.
    pub async fn run_periodic(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let periodic = self
            .config
            .periodic
            .ok_or_else(|| Error::Config("periodic sync is not configured".into()))?;

        let mut ticker = tokio::time::interval(periodic.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => match self.synchronize().await {
                    Ok(SyncResult::Success { timestamp }) => {
                        tracing::info!("Periodic sync finished at {timestamp}");
                    }
                    Ok(SyncResult::Error(errors)) => {
                        tracing::warn!("Periodic sync finished with {} error(s)", errors.len());
                    }
                    Err(Error::Cancelled) => break,
                    Err(error) => tracing::error!("Periodic sync failed: {error}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Periodic sync stopped");
        Ok(())
    }

    async fn run(&self, direction: Direction) -> Result<SyncResult> {
        self.emit(SyncJobStatus::Started).await;
        let mut attempt = 0;
        loop {
            let errors = match self.pass(direction).await {
                Ok(errors) => errors,
                Err(error) => {
                    tracing::warn!("Sync pass aborted: {error}");
                    return Err(error);
                }
            };

            if errors.is_empty() {
                let timestamp = timestamp_now();
                self.store.set_last_sync_timestamp(&timestamp).await?;
                tracing::info!("Sync succeeded at {timestamp}");
                self.emit(SyncJobStatus::Succeeded {
                    timestamp: timestamp.clone(),
                })
                .await;
                return Ok(SyncResult::Success { timestamp });
            }

            match self.config.retry {
                Some(retry) if attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.delay(attempt);
                    tracing::warn!(
                        "Sync pass had {} error(s); retry {attempt}/{} in {delay:?}",
                        errors.len(),
                        retry.max_retries
                    );
                    self.sleep(delay).await?;
                }
                _ => {
                    tracing::warn!("Sync failed with {} error(s)", errors.len());
                    self.emit(SyncJobStatus::Failed {
                        errors: errors.clone(),
                    })
                    .await;
                    return Ok(SyncResult::Error(errors));
                }
            }
        }
    }

    async fn pass(&self, direction: Direction) -> Result<Vec<ResourceSyncError>> {
        let mut errors = Vec::new();
        if direction.downloads() {
            errors.extend(self.download_pass().await?);
        }
        if direction.uploads() {
            errors.extend(self.upload_pass().await?);
        }
        Ok(errors)
    }

    async fn download_pass(&self) -> Result<Vec<ResourceSyncError>> {
        if self.config.download.is_empty() {
            tracing::debug!("No download requests configured");
            return Ok(Vec::new());
        }

        let downloader = Downloader::new(self.store.clone(), Arc::clone(&self.data_source));
        let mut manager = ResourceParamsDownloadWorkManager::new(self.config.download.clone());
        // counted in resources when the server reports totals, in requests otherwise
        let remote_total = downloader.count_remote(&mut manager).await?;
        if let Some(total) = remote_total {
            tracing::debug!("Server reports {total} resource(s) to download");
        }

        let mut downloaded = 0;
        let mut errors = Vec::new();
        loop {
            self.check_cancelled()?;
            let Some(page) = downloader
                .download_next(&mut manager, self.resolver.as_ref())
                .await?
            else {
                break;
            };
            downloaded += page.downloaded;
            errors.extend(page.error);

            let (total, completed) = match remote_total {
                Some(total) => (total, downloaded.min(total)),
                None => {
                    let progress = manager.progress();
                    (progress.total, progress.completed)
                }
            };
            self.emit(SyncJobStatus::InProgress {
                operation: SyncOperation::Download,
                total,
                completed,
            })
            .await;
        }
        Ok(errors)
    }

    async fn upload_pass(&self) -> Result<Vec<ResourceSyncError>> {
        let uploader = Uploader::new(
            self.store.clone(),
            Arc::clone(&self.data_source),
            self.config.upload_mode,
        )
        .with_etag_for_upload(self.config.use_etag_for_upload);
        let mut fetcher = LocalChangeFetcher::new(self.store.clone(), self.config.fetch_mode);
        let total = fetcher.init_total_count().await?;
        if total == 0 {
            tracing::debug!("No local changes to upload");
            return Ok(Vec::new());
        }
        self.emit(SyncJobStatus::InProgress {
            operation: SyncOperation::Upload,
            total,
            completed: 0,
        })
        .await;

        let mut errors = Vec::new();
        while fetcher.has_next().await? {
            self.check_cancelled()?;
            let outcome = uploader.upload_next(&mut fetcher).await?;
            errors.extend(outcome.errors);

            let progress = fetcher.progress().await?;
            self.emit(SyncJobStatus::InProgress {
                operation: SyncOperation::Upload,
                total: progress.initial_total,
                completed: progress.completed(),
            })
            .await;
        }
        Ok(errors)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.as_ref().is_some_and(|cancel| *cancel.borrow()) {
            tracing::info!("Sync cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Sleep between retries, waking early on cancellation.
    async fn sleep(&self, delay: Duration) -> Result<()> {
        let Some(mut cancel) = self.cancel.clone() else {
            tokio::time::sleep(delay).await;
            return Ok(());
        };
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            Ok(_) = cancel.wait_for(|cancelled| *cancelled) => Err(Error::Cancelled),
        }
    }

    async fn emit(&self, status: SyncJobStatus) {
        if let Some(sender) = &self.status {
            if sender.send(status).await.is_err() {
                tracing::debug!("Sync status receiver dropped");
            }
        }
    }
}
