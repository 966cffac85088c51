//! Upload, download and conflict handling against a FHIR server

mod conflict;
mod data_source;
mod download;
mod fetcher;
mod request;
mod synchronizer;
mod uploader;

pub use conflict::{
    AcceptLocalConflictResolver, AcceptRemoteConflictResolver, ConflictResolution,
    ConflictResolver,
};
pub use data_source::{DataSource, HttpDataSource};
pub use download::{
    DownloadContext, DownloadProgress, DownloadSyncResult, DownloadWorkManager, Downloader,
    PageOutcome, ResourceParamsDownloadWorkManager,
};
pub use fetcher::{FetchProgress, LocalChangeFetcher};
pub use request::{IndividualRequestGenerator, TransactionBundleGenerator, UrlUploadRequest};
pub use synchronizer::{SyncJobStatus, SyncOperation, SyncResult, Synchronizer};
pub use uploader::{BatchOutcome, UploadConfirmation, UploadSyncResult, Uploader};
