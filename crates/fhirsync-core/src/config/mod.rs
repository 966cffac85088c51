//! Sync configuration.
//!
//! `SyncConfig` is loaded from JSON by clients and describes the remote FHIR
//! server, how local changes are batched and uploaded, what to download, and
//! the optional retry and periodic schedules.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How the fetcher groups pending changes for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// One resource's net change per call
    #[default]
    PerResource,
    /// Up to `size` resources' net changes per call
    PerBatch { size: usize },
    /// Every log row on its own, unsquashed, in the order it was recorded
    PerChange,
}

/// Verb used to upload locally inserted resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InsertVerb {
    /// `PUT Type/id`, keeping the client-assigned id
    #[default]
    Put,
    /// `POST Type`, letting the server assign the id
    Post,
}

/// Shape of upload requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// One transaction bundle per fetched batch
    Bundle {
        #[serde(default)]
        insert_verb: InsertVerb,
    },
    /// One HTTP request per change
    Individual {
        #[serde(default)]
        insert_verb: InsertVerb,
    },
}

impl Default for UploadMode {
    fn default() -> Self {
        Self::Bundle {
            insert_verb: InsertVerb::default(),
        }
    }
}

/// One resource type to download, with extra search parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownloadRequest {
    pub resource_type: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl DownloadRequest {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffPolicy {
    #[default]
    Linear,
    Exponential,
}

/// Whole-pass retry schedule for failed syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfiguration {
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    #[serde(default)]
    pub backoff: BackoffPolicy,
}

impl RetryConfiguration {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let secs = match self.backoff {
            BackoffPolicy::Linear => self.initial_backoff_secs.saturating_mul(u64::from(attempt)),
            BackoffPolicy::Exponential => self
                .initial_backoff_secs
                .saturating_mul(2u64.saturating_pow(attempt - 1)),
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodicSyncConfiguration {
    pub interval_secs: u64,
}

impl PeriodicSyncConfiguration {
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Remote server and sync behavior.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub fetch_mode: FetchMode,
    #[serde(default)]
    pub upload_mode: UploadMode,
    /// Send `If-Match` with the version each UPDATE and DELETE was made against
    #[serde(default)]
    pub use_etag_for_upload: bool,
    #[serde(default)]
    pub download: Vec<DownloadRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic: Option<PeriodicSyncConfiguration>,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout_secs", &self.timeout_secs)
            .field("fetch_mode", &self.fetch_mode)
            .field("upload_mode", &self.upload_mode)
            .field("use_etag_for_upload", &self.use_etag_for_upload)
            .field("download", &self.download)
            .field("retry", &self.retry)
            .field("periodic", &self.periodic)
            .finish()
    }
}

impl SyncConfig {
    /// Create a configuration for the given server with default behavior
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            fetch_mode: FetchMode::default(),
            upload_mode: UploadMode::default(),
            use_etag_for_upload: false,
            download: Vec::new(),
            retry: None,
            periodic: None,
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub const fn with_fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.fetch_mode = fetch_mode;
        self
    }

    #[must_use]
    pub const fn with_upload_mode(mut self, upload_mode: UploadMode) -> Self {
        self.upload_mode = upload_mode;
        self
    }

    #[must_use]
    pub const fn with_etag_for_upload(mut self, enabled: bool) -> Self {
        self.use_etag_for_upload = enabled;
        self
    }

    #[must_use]
    pub fn with_download(mut self, request: DownloadRequest) -> Self {
        self.download.push(request);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfiguration) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub const fn with_periodic(mut self, periodic: PeriodicSyncConfiguration) -> Self {
        self.periodic = Some(periodic);
        self
    }

    /// HTTP client timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid sync config JSON: {error}")))?;
        config.validate()
    }

    /// Check the configuration, returning it with the base URL normalized.
    pub fn validate(mut self) -> Result<Self> {
        let base_url = normalize_text_option(Some(self.base_url))
            .ok_or_else(|| Error::Config("base_url is required".into()))?;
        if !is_http_url(&base_url) {
            return Err(Error::Config(
                "base_url must include http:// or https://".into(),
            ));
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.auth_token = normalize_text_option(self.auth_token);

        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than zero".into()));
        }
        if self.fetch_mode == (FetchMode::PerBatch { size: 0 }) {
            return Err(Error::Config("per_batch size must be greater than zero".into()));
        }
        if let Some(request) = self
            .download
            .iter()
            .find(|request| request.resource_type.trim().is_empty())
        {
            return Err(Error::Config(format!(
                "download entry has an empty resource_type: {request:?}"
            )));
        }
        if self.periodic.is_some_and(|periodic| periodic.interval_secs == 0) {
            return Err(Error::Config("periodic interval_secs must be greater than zero".into()));
        }
        Ok(self)
    }
}
