//! Paged downloads merged into the store

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::DownloadRequest;
use crate::error::{Error, ResourceSyncError, Result};
use crate::models::{Bundle, BundleType, OperationOutcome, Resource};
use crate::services::FhirStore;
use crate::util::resource_type_from_url;

use super::conflict::ConflictResolver;
use super::data_source::DataSource;

const SORT_PARAM: &str = "_sort";
const LAST_UPDATED_PARAM: &str = "_lastUpdated";
const SUMMARY_PARAM: &str = "_summary";

/// Local state a work manager consults when building request URLs.
#[async_trait]
pub trait DownloadContext: Send + Sync {
    /// Newest `meta.lastUpdated` already downloaded for a resource type.
    async fn last_update(&self, resource_type: &str) -> Result<Option<String>>;
}

#[async_trait]
impl DownloadContext for FhirStore {
    async fn last_update(&self, resource_type: &str) -> Result<Option<String>> {
        Self::last_update(self, resource_type).await
    }
}

/// Download progress in work items (one per configured request).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub total: usize,
    pub completed: usize,
}

/// Decides which URL to fetch next and turns responses into resources.
#[async_trait]
pub trait DownloadWorkManager: Send {
    /// Next URL to GET, or `None` when there is nothing left.
    async fn next_request_url(&mut self, ctx: &dyn DownloadContext) -> Result<Option<String>>;

    /// Extract resources from a response, queueing follow-up pages.
    async fn process_response(&mut self, response: Value) -> Result<Vec<Resource>>;

    /// Count-only (`_summary=count`) URLs for the searches still queued.
    ///
    /// Their totals let progress be reported in resources. Managers that
    /// cannot tell return nothing.
    async fn summary_request_urls(&mut self, _ctx: &dyn DownloadContext) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn progress(&self) -> DownloadProgress;
}

/// Walks a list of `(resource type, search params)` requests in order,
/// following each searchset's `next` links before moving on.
#[derive(Debug)]
pub struct ResourceParamsDownloadWorkManager {
    queue: VecDeque<DownloadRequest>,
    total: usize,
    next_url: Option<String>,
    in_flight: bool,
}

impl ResourceParamsDownloadWorkManager {
    pub fn new(requests: Vec<DownloadRequest>) -> Self {
        Self {
            total: requests.len(),
            queue: requests.into(),
            next_url: None,
            in_flight: false,
        }
    }
}

/// Caller params first, then `_sort=_lastUpdated` and
/// `_lastUpdated=gt<since>` unless the caller already set them.
fn search_params(request: &DownloadRequest, since: Option<&str>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = request
        .params
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if !request.params.contains_key(SORT_PARAM) {
        params.push((SORT_PARAM.into(), LAST_UPDATED_PARAM.into()));
    }
    if let Some(since) = since.filter(|since| !since.is_empty()) {
        if !request.params.contains_key(LAST_UPDATED_PARAM) {
            params.push((LAST_UPDATED_PARAM.into(), format!("gt{since}")));
        }
    }
    params
}

/// `Type?key=value&...` with keys and values percent-encoded.
fn encode_url(resource_type: &str, params: &[(String, String)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{resource_type}?{query}")
}

fn search_url(request: &DownloadRequest, since: Option<&str>) -> String {
    encode_url(&request.resource_type, &search_params(request, since))
}

#[async_trait]
impl DownloadWorkManager for ResourceParamsDownloadWorkManager {
    async fn next_request_url(&mut self, ctx: &dyn DownloadContext) -> Result<Option<String>> {
        if let Some(url) = self.next_url.take() {
            return Ok(Some(url));
        }
        self.in_flight = false;
        let Some(request) = self.queue.pop_front() else {
            return Ok(None);
        };
        self.in_flight = true;
        let since = ctx.last_update(&request.resource_type).await?;
        Ok(Some(search_url(&request, since.as_deref())))
    }

    async fn process_response(&mut self, response: Value) -> Result<Vec<Resource>> {
        if let Some(outcome) = OperationOutcome::from_value(&response) {
            return Err(Error::Outcome(outcome.diagnostics()));
        }

        let Some(bundle) = Bundle::from_value(&response) else {
            self.in_flight = false;
            // a plain read returns the resource itself
            return Ok(vec![Resource::from_value(response)?]);
        };
        self.next_url = if bundle.bundle_type == BundleType::Searchset {
            bundle.link_url("next").map(ToString::to_string)
        } else {
            None
        };
        self.in_flight = self.next_url.is_some();
        bundle
            .resources()
            .cloned()
            .map(Resource::from_value)
            .collect()
    }

    async fn summary_request_urls(&mut self, ctx: &dyn DownloadContext) -> Result<Vec<String>> {
        let mut urls = Vec::with_capacity(self.queue.len());
        for request in &self.queue {
            let since = ctx.last_update(&request.resource_type).await?;
            let mut params = search_params(request, since.as_deref());
            params.push((SUMMARY_PARAM.into(), "count".into()));
            urls.push(encode_url(&request.resource_type, &params));
        }
        Ok(urls)
    }

    fn progress(&self) -> DownloadProgress {
        DownloadProgress {
            total: self.total,
            completed: self.total - self.queue.len() - usize::from(self.in_flight),
        }
    }
}

/// Result of downloading everything a work manager asks for.
#[derive(Debug, Clone)]
pub enum DownloadSyncResult {
    Success { downloaded: usize, conflicts: usize },
    Error(Vec<ResourceSyncError>),
}

/// Result of one fetched page.
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub downloaded: usize,
    pub conflicts: usize,
    pub error: Option<ResourceSyncError>,
}

/// Fetches pages and commits each through [`FhirStore::save_remote_page`].
pub struct Downloader {
    store: FhirStore,
    data_source: Arc<dyn DataSource>,
}

// Failures of the local database abort the pass; anything else is charged to
// the page that caused it.
const fn is_local_failure(error: &Error) -> bool {
    matches!(error, Error::Database(_) | Error::LibSql(_) | Error::Io(_))
}

impl Downloader {
    pub fn new(store: FhirStore, data_source: Arc<dyn DataSource>) -> Self {
        Self { store, data_source }
    }

    /// Download and merge every page the manager hands out.
    pub async fn download(
        &self,
        manager: &mut dyn DownloadWorkManager,
        resolver: &dyn ConflictResolver,
    ) -> Result<DownloadSyncResult> {
        let mut downloaded = 0;
        let mut conflicts = 0;
        let mut errors = Vec::new();
        while let Some(page) = self.download_next(manager, resolver).await? {
            downloaded += page.downloaded;
            conflicts += page.conflicts;
            errors.extend(page.error);
        }

        if errors.is_empty() {
            Ok(DownloadSyncResult::Success {
                downloaded,
                conflicts,
            })
        } else {
            Ok(DownloadSyncResult::Error(errors))
        }
    }

    /// Number of resources the manager's queued searches match on the server.
    ///
    /// `None` when the manager offers no count requests or the server leaves
    /// any `total` out; callers then fall back to request-based progress.
    pub async fn count_remote(&self, manager: &mut dyn DownloadWorkManager) -> Result<Option<usize>> {
        let urls = manager.summary_request_urls(&self.store).await?;
        if urls.is_empty() {
            return Ok(None);
        }

        let mut total: usize = 0;
        for url in urls {
            let count = match self.data_source.download(&url).await {
                Ok(response) => Bundle::from_value(&response).and_then(|bundle| bundle.total),
                Err(error) if is_local_failure(&error) => return Err(error),
                Err(error) => {
                    tracing::debug!("Count request {url} failed: {error}");
                    None
                }
            };
            let Some(count) = count else {
                tracing::debug!("No total for {url}; progress falls back to requests");
                return Ok(None);
            };
            total = total.saturating_add(usize::try_from(count).unwrap_or(usize::MAX));
        }
        Ok(Some(total))
    }

    /// Fetch and commit one page. `None` once the manager is exhausted.
    pub async fn download_next(
        &self,
        manager: &mut dyn DownloadWorkManager,
        resolver: &dyn ConflictResolver,
    ) -> Result<Option<PageOutcome>> {
        let Some(url) = manager.next_request_url(&self.store).await? else {
            return Ok(None);
        };

        match self.fetch_page(manager, &url, resolver).await {
            Ok((downloaded, conflicts)) => {
                tracing::debug!("Saved {downloaded} resource(s) from {url}");
                Ok(Some(PageOutcome {
                    downloaded,
                    conflicts,
                    error: None,
                }))
            }
            Err(error) if is_local_failure(&error) => Err(error),
            Err(error) => {
                tracing::warn!("Download of {url} failed: {error}");
                let resource_type =
                    resource_type_from_url(&url).unwrap_or_else(|| "Unknown".to_string());
                Ok(Some(PageOutcome {
                    error: Some(ResourceSyncError::new(resource_type, error)),
                    ..PageOutcome::default()
                }))
            }
        }
    }

    async fn fetch_page(
        &self,
        manager: &mut dyn DownloadWorkManager,
        url: &str,
        resolver: &dyn ConflictResolver,
    ) -> Result<(usize, usize)> {
        let response = self.data_source.download(url).await?;
        let resources = manager.process_response(response).await?;
        let downloaded = resources.len();
        if downloaded == 0 {
            return Ok((0, 0));
        }
        let conflicts = self.store.save_remote_page(resources, resolver).await?;
        Ok((downloaded, conflicts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::conflict::AcceptRemoteConflictResolver;
    use crate::sync::request::UrlUploadRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedContext(HashMap<String, String>);

    #[async_trait]
    impl DownloadContext for FixedContext {
        async fn last_update(&self, resource_type: &str) -> Result<Option<String>> {
            Ok(self.0.get(resource_type).cloned())
        }
    }

    fn context(entries: &[(&str, &str)]) -> FixedContext {
        FixedContext(
            entries
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        )
    }

    /// Serves canned pages by URL and records what was requested.
    struct PagedDataSource {
        pages: HashMap<String, Value>,
        requested: Mutex<Vec<String>>,
    }

    impl PagedDataSource {
        fn new(pages: &[(&str, Value)]) -> Arc<Self> {
            Arc::new(Self {
                pages: pages
                    .iter()
                    .map(|(url, page)| ((*url).to_string(), page.clone()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DataSource for PagedDataSource {
        async fn download(&self, url: &str) -> Result<Value> {
            self.requested.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| Error::Server {
                status: 404,
                message: format!("no page at {url}"),
            })
        }

        async fn upload_bundle(&self, _bundle: &Bundle) -> Result<Value> {
            Err(Error::Upload("upload not expected".into()))
        }

        async fn upload_request(&self, _request: &UrlUploadRequest) -> Result<Value> {
            Err(Error::Upload("upload not expected".into()))
        }
    }

    fn searchset(resources: &[Value], next: Option<&str>) -> Value {
        let entry: Vec<Value> = resources.iter().map(|r| json!({"resource": r})).collect();
        let link: Vec<Value> = next
            .map(|url| vec![json!({"relation": "next", "url": url})])
            .unwrap_or_default();
        json!({"resourceType": "Bundle", "type": "searchset", "entry": entry, "link": link})
    }

    fn patient(id: &str, last_updated: &str) -> Value {
        json!({"resourceType": "Patient", "id": id, "meta": {"versionId": "1", "lastUpdated": last_updated}})
    }

    async fn urls(manager: &mut ResourceParamsDownloadWorkManager, ctx: &FixedContext) -> Vec<String> {
        let mut urls = Vec::new();
        while let Some(url) = manager.next_request_url(ctx).await.unwrap() {
            urls.push(url);
        }
        urls
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn appends_sort_and_last_updated_after_caller_params() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient").with_param("address-city", "NAIROBI"),
        ]);
        let ctx = context(&[("Patient", "2022-03-20")]);
        assert_eq!(
            urls(&mut manager, &ctx).await,
            vec!["Patient?address-city=NAIROBI&_sort=_lastUpdated&_lastUpdated=gt2022-03-20"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn caller_sort_and_last_updated_win() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient")
                .with_param("_sort", "status")
                .with_param("_lastUpdated", "2022-06-28"),
        ]);
        let ctx = context(&[("Patient", "2022-03-20")]);
        assert_eq!(
            urls(&mut manager, &ctx).await,
            vec!["Patient?_lastUpdated=2022-06-28&_sort=status"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn caller_last_updated_still_gets_default_sort() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient").with_param("_lastUpdated", "gt2022-06-28"),
        ]);
        let ctx = context(&[]);
        assert_eq!(
            urls(&mut manager, &ctx).await,
            vec!["Patient?_lastUpdated=gt2022-06-28&_sort=_lastUpdated"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_timestamp_is_ignored() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient"),
            DownloadRequest::new("Observation"),
        ]);
        let ctx = context(&[("Patient", "")]);
        assert_eq!(
            urls(&mut manager, &ctx).await,
            vec!["Patient?_sort=_lastUpdated", "Observation?_sort=_lastUpdated"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn query_values_are_percent_encoded() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Observation").with_param("code", "http://loinc.org|1234-5"),
        ]);
        let ctx = context(&[("Observation", "2024-01-01T10:00:00.000+00:00")]);
        assert_eq!(
            urls(&mut manager, &ctx).await,
            vec![
                "Observation?code=http%3A%2F%2Floinc.org%7C1234-5&_sort=_lastUpdated\
                 &_lastUpdated=gt2024-01-01T10%3A00%3A00.000%2B00%3A00"
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn summary_urls_cover_queued_requests() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient").with_param("address-city", "NAIROBI"),
            DownloadRequest::new("Immunization"),
            DownloadRequest::new("Observation"),
        ]);
        let ctx = context(&[("Patient", "2022-03-20"), ("Observation", "2022-03-20")]);

        assert_eq!(
            manager.summary_request_urls(&ctx).await.unwrap(),
            vec![
                "Patient?address-city=NAIROBI&_sort=_lastUpdated&_lastUpdated=gt2022-03-20&_summary=count",
                "Immunization?_sort=_lastUpdated&_summary=count",
                "Observation?_sort=_lastUpdated&_lastUpdated=gt2022-03-20&_summary=count",
            ]
        );
        // asking for counts does not consume the queue
        assert_eq!(urls(&mut manager, &ctx).await.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn count_remote_sums_totals() {
        let store = FhirStore::open_in_memory().await.unwrap();
        let total = |n: u64| json!({"resourceType": "Bundle", "type": "searchset", "total": n});
        let source = PagedDataSource::new(&[
            ("Patient?_sort=_lastUpdated&_summary=count", total(3)),
            ("Observation?_sort=_lastUpdated&_summary=count", total(4)),
        ]);
        let downloader = Downloader::new(store, source);
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient"),
            DownloadRequest::new("Observation"),
        ]);
        assert_eq!(downloader.count_remote(&mut manager).await.unwrap(), Some(7));

        // a server without totals leaves progress to the request count
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient"),
            DownloadRequest::new("Encounter"),
        ]);
        assert_eq!(downloader.count_remote(&mut manager).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offset_watermark_reaches_server_intact() {
        use crate::config::SyncConfig;
        use crate::sync::data_source::HttpDataSource;
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fhir/Patient"))
            .and(query_param("_lastUpdated", "gt2024-01-01T10:00:00.000+00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(searchset(
                &[patient("p-2", "2024-01-02T00:00:00.000+00:00")],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let store = FhirStore::open_in_memory().await.unwrap();
        store
            .insert_remote(vec![Resource::from_value(patient(
                "p-1",
                "2024-01-01T10:00:00.000+00:00",
            ))
            .unwrap()])
            .await
            .unwrap();
        let source = HttpDataSource::new(&SyncConfig::new(format!("{}/fhir", server.uri()))).unwrap();
        let downloader = Downloader::new(store.clone(), Arc::new(source));
        let mut manager =
            ResourceParamsDownloadWorkManager::new(vec![DownloadRequest::new("Patient")]);

        let result = downloader
            .download(&mut manager, &AcceptRemoteConflictResolver)
            .await
            .unwrap();
        assert!(matches!(
            result,
            DownloadSyncResult::Success { downloaded: 1, conflicts: 0 }
        ));
        assert!(store.select("Patient", "p-2").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn follows_next_links_before_next_type() {
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient"),
            DownloadRequest::new("Observation"),
        ]);
        let ctx = context(&[]);

        let first = manager.next_request_url(&ctx).await.unwrap();
        assert_eq!(first.as_deref(), Some("Patient?_sort=_lastUpdated"));
        assert_eq!(manager.progress(), DownloadProgress { total: 2, completed: 0 });

        let resources = manager
            .process_response(searchset(
                &[patient("p-1", "2024-01-01T00:00:00Z")],
                Some("http://server/fhir?page=2"),
            ))
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);

        let second = manager.next_request_url(&ctx).await.unwrap();
        assert_eq!(second.as_deref(), Some("http://server/fhir?page=2"));
        manager
            .process_response(searchset(&[], None))
            .await
            .unwrap();

        let third = manager.next_request_url(&ctx).await.unwrap();
        assert_eq!(third.as_deref(), Some("Observation?_sort=_lastUpdated"));
        assert_eq!(manager.progress(), DownloadProgress { total: 2, completed: 1 });

        assert_eq!(manager.next_request_url(&ctx).await.unwrap(), None);
        assert_eq!(manager.progress(), DownloadProgress { total: 2, completed: 2 });
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn operation_outcome_is_an_error() {
        let mut manager = ResourceParamsDownloadWorkManager::new(Vec::new());
        let error = manager
            .process_response(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "code": "processing", "diagnostics": "Too many results"}]
            }))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Outcome(ref message) if message == "Too many results"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn downloader_saves_pages_and_advances_watermark() {
        let store = FhirStore::open_in_memory().await.unwrap();
        let source = PagedDataSource::new(&[
            (
                "Patient?_sort=_lastUpdated",
                searchset(&[patient("p-1", "2024-01-01T00:00:00Z")], Some("Patient?page=2")),
            ),
            (
                "Patient?page=2",
                searchset(&[patient("p-2", "2024-02-01T00:00:00Z")], None),
            ),
        ]);
        let downloader = Downloader::new(store.clone(), source.clone());
        let mut manager =
            ResourceParamsDownloadWorkManager::new(vec![DownloadRequest::new("Patient")]);

        let result = downloader
            .download(&mut manager, &AcceptRemoteConflictResolver)
            .await
            .unwrap();
        assert!(matches!(
            result,
            DownloadSyncResult::Success { downloaded: 2, conflicts: 0 }
        ));
        assert_eq!(store.select("Patient", "p-2").await.unwrap().id(), Some("p-2"));
        assert_eq!(
            store.last_update("Patient").await.unwrap().as_deref(),
            Some("2024-02-01T00:00:00Z")
        );
        // downloads never enter the change log
        assert_eq!(store.count_local_changes().await.unwrap(), 0);

        // the next pass asks only for newer resources
        let mut manager =
            ResourceParamsDownloadWorkManager::new(vec![DownloadRequest::new("Patient")]);
        downloader
            .download(&mut manager, &AcceptRemoteConflictResolver)
            .await
            .unwrap();
        let requested = source.requested.lock().unwrap().clone();
        assert_eq!(
            requested.last().map(String::as_str),
            Some("Patient?_sort=_lastUpdated&_lastUpdated=gt2024-02-01T00%3A00%3A00Z")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_page_is_reported_and_others_continue() {
        let store = FhirStore::open_in_memory().await.unwrap();
        let source = PagedDataSource::new(&[(
            "Observation?_sort=_lastUpdated",
            searchset(
                &[json!({"resourceType": "Observation", "id": "o-1", "status": "final"})],
                None,
            ),
        )]);
        let downloader = Downloader::new(store.clone(), source);
        let mut manager = ResourceParamsDownloadWorkManager::new(vec![
            DownloadRequest::new("Patient"),
            DownloadRequest::new("Observation"),
        ]);

        let DownloadSyncResult::Error(errors) = downloader
            .download(&mut manager, &AcceptRemoteConflictResolver)
            .await
            .unwrap()
        else {
            panic!("expected a download error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].resource_type, "Patient");
        assert!(store.select("Observation", "o-1").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn conflicts_are_resolved_and_counted() {
        let store = FhirStore::open_in_memory().await.unwrap();
        store
            .insert(vec![Resource::from_value(json!({"resourceType": "Patient", "id": "p-1", "active": true})).unwrap()])
            .await
            .unwrap();
        let source = PagedDataSource::new(&[(
            "Patient?_sort=_lastUpdated",
            searchset(&[patient("p-1", "2024-01-01T00:00:00Z")], None),
        )]);
        let downloader = Downloader::new(store.clone(), source);
        let mut manager =
            ResourceParamsDownloadWorkManager::new(vec![DownloadRequest::new("Patient")]);

        let result = downloader
            .download(&mut manager, &AcceptRemoteConflictResolver)
            .await
            .unwrap();
        assert!(matches!(
            result,
            DownloadSyncResult::Success { downloaded: 1, conflicts: 1 }
        ));
        // accepting the remote version leaves nothing to upload
        assert_eq!(store.count_local_changes().await.unwrap(), 0);
        assert_eq!(store.select("Patient", "p-1").await.unwrap().as_value().get("active"), None);
    }
}
