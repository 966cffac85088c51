//! Uploading squashed local changes and confirming them locally

use std::sync::Arc;

use serde_json::Value;

use crate::config::UploadMode;
use crate::error::{Error, ResourceSyncError, Result};
use crate::models::{
    Bundle, BundleEntry, BundleResponse, BundleType, HttpVerb, LocalChangeType, OperationOutcome,
    ResourceKey, SquashedLocalChange,
};
use crate::services::FhirStore;

use super::data_source::DataSource;
use super::fetcher::LocalChangeFetcher;
use super::request::{IndividualRequestGenerator, TransactionBundleGenerator, UrlUploadRequest};

/// Result of uploading every pending change once.
#[derive(Debug, Clone)]
pub enum UploadSyncResult {
    Success { uploaded: usize },
    Error(Vec<ResourceSyncError>),
}

/// Result of uploading one fetched batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub uploaded: usize,
    pub errors: Vec<ResourceSyncError>,
}

type ChangeResult = std::result::Result<UploadConfirmation, Arc<Error>>;

/// What the server confirmed for one uploaded change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadConfirmation {
    /// Id the server assigned to a POSTed resource
    pub server_id: Option<String>,
    pub version_id: Option<String>,
    pub last_updated: Option<String>,
}

impl UploadConfirmation {
    fn from_resource(resource: &Value) -> Self {
        Self {
            server_id: None,
            version_id: resource
                .pointer("/meta/versionId")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            last_updated: resource
                .pointer("/meta/lastUpdated")
                .and_then(Value::as_str)
                .map(ToString::to_string),
        }
    }
}

// An upload counts as confirmed when the server echoes the resource (same id),
// answers with an all-information OperationOutcome, or reports a 2xx status
// for a transaction entry without a body. POST echoes only need the same type
// since the server picks the id. Anything else leaves the change in the log.
fn confirm_response(
    change: &SquashedLocalChange,
    verb: HttpVerb,
    body: Option<&Value>,
    entry_status_ok: Option<bool>,
) -> Option<UploadConfirmation> {
    let local = &change.local_change;
    match body {
        Some(body) if body.get("id").and_then(Value::as_str) == Some(local.resource_id.as_str()) => {
            Some(UploadConfirmation::from_resource(body))
        }
        Some(body) if OperationOutcome::from_value(body).is_some_and(|o| o.is_all_information()) => {
            Some(UploadConfirmation::default())
        }
        Some(body)
            if verb == HttpVerb::Post
                && body.get("resourceType").and_then(Value::as_str)
                    == Some(local.resource_type.as_str()) =>
        {
            Some(UploadConfirmation {
                server_id: body.get("id").and_then(Value::as_str).map(ToString::to_string),
                ..UploadConfirmation::from_resource(body)
            })
        }
        Some(Value::Null) | None => match entry_status_ok {
            Some(true) => Some(UploadConfirmation::default()),
            // a bare 2xx to a standalone DELETE has nothing to echo
            None if local.change_type == LocalChangeType::Delete => {
                Some(UploadConfirmation::default())
            }
            _ => None,
        },
        Some(_) => None,
    }
}

/// Uploads fetched changes and removes confirmed ones from the log.
///
/// One resource's failure never blocks the others: it is reported, skipped
/// for the rest of the pass, and its changes stay pending. Only local
/// database failures are returned as `Err`.
pub struct Uploader {
    store: FhirStore,
    data_source: Arc<dyn DataSource>,
    mode: UploadMode,
    use_etag: bool,
}

impl Uploader {
    pub fn new(store: FhirStore, data_source: Arc<dyn DataSource>, mode: UploadMode) -> Self {
        Self {
            store,
            data_source,
            mode,
            use_etag: false,
        }
    }

    /// Pin UPDATE and DELETE uploads to the server version they were made against.
    #[must_use]
    pub const fn with_etag_for_upload(mut self, use_etag: bool) -> Self {
        self.use_etag = use_etag;
        self
    }

    /// Upload until the fetcher has nothing left.
    pub async fn upload(&self, fetcher: &mut LocalChangeFetcher) -> Result<UploadSyncResult> {
        fetcher.init_total_count().await?;
        let mut uploaded = 0;
        let mut errors = Vec::new();
        while fetcher.has_next().await? {
            let outcome = self.upload_next(fetcher).await?;
            uploaded += outcome.uploaded;
            errors.extend(outcome.errors);
        }

        if errors.is_empty() {
            Ok(UploadSyncResult::Success { uploaded })
        } else {
            Ok(UploadSyncResult::Error(errors))
        }
    }

    /// Upload the fetcher's next batch.
    pub async fn upload_next(&self, fetcher: &mut LocalChangeFetcher) -> Result<BatchOutcome> {
        let batch = fetcher.next().await?;
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let results = match self.mode {
            UploadMode::Bundle { insert_verb } => {
                let generator = TransactionBundleGenerator::new(insert_verb).with_etag(self.use_etag);
                self.upload_bundle(&batch, generator).await
            }
            UploadMode::Individual { insert_verb } => {
                let generator = IndividualRequestGenerator::new(insert_verb).with_etag(self.use_etag);
                self.upload_individually(&batch, generator).await
            }
        };

        let mut outcome = BatchOutcome::default();
        for (change, result) in batch.iter().zip(results) {
            match result {
                Ok(confirmation) => {
                    self.store.consolidate_upload(change, &confirmation).await?;
                    outcome.uploaded += 1;
                }
                Err(source) => {
                    tracing::warn!("Upload of {} failed: {source}", change.key());
                    fetcher.skip(change);
                    outcome
                        .errors
                        .push(ResourceSyncError::shared(change.resource_type(), source));
                }
            }
        }

        tracing::info!(
            "Uploaded {} of {} change(s) in batch",
            outcome.uploaded,
            batch.len()
        );
        Ok(outcome)
    }

    async fn upload_bundle(
        &self,
        batch: &[SquashedLocalChange],
        generator: TransactionBundleGenerator,
    ) -> Vec<ChangeResult> {
        let fail_all = |error: Error| -> Vec<ChangeResult> {
            let error = Arc::new(error);
            batch.iter().map(|_| Err(Arc::clone(&error))).collect()
        };

        let bundle = match generator.generate(&[batch.to_vec()]) {
            Ok(mut bundles) if bundles.len() == 1 => bundles.remove(0).0,
            Ok(_) => return fail_all(Error::Upload("no bundle generated for batch".into())),
            Err(error) => return fail_all(error),
        };
        let verbs: Vec<HttpVerb> = bundle
            .entry
            .iter()
            .map(|entry| entry.request.as_ref().map_or(HttpVerb::Post, |r| r.method))
            .collect();

        let response = match self.data_source.upload_bundle(&bundle).await {
            Ok(response) => response,
            Err(error) => return fail_all(error),
        };

        if let Some(outcome) = OperationOutcome::from_value(&response) {
            if outcome.is_all_information() {
                return batch
                    .iter()
                    .map(|_| Ok(UploadConfirmation::default()))
                    .collect();
            }
            return fail_all(Error::Outcome(outcome.diagnostics()));
        }

        let Some(response_bundle) = Bundle::from_value(&response)
            .filter(|bundle| bundle.bundle_type == BundleType::TransactionResponse)
        else {
            return fail_all(Error::Upload(
                "response is neither a transaction-response nor an OperationOutcome".into(),
            ));
        };

        if response_bundle.entry.len() != batch.len() {
            return fail_all(Error::Upload(format!(
                "transaction-response has {} entries for {} requests",
                response_bundle.entry.len(),
                batch.len()
            )));
        }

        batch
            .iter()
            .zip(verbs)
            .zip(&response_bundle.entry)
            .map(|((change, verb), entry)| confirm_entry(change, verb, entry))
            .collect()
    }

    async fn upload_individually(
        &self,
        batch: &[SquashedLocalChange],
        generator: IndividualRequestGenerator,
    ) -> Vec<ChangeResult> {
        let mut results = Vec::with_capacity(batch.len());
        for change in batch {
            let result = match generator.generate(std::slice::from_ref(change)) {
                Ok(mut requests) if requests.len() == 1 => {
                    let request = requests.remove(0);
                    self.send_request(change, &request).await
                }
                Ok(_) => Err(Error::Upload("no request generated for change".into())),
                Err(error) => Err(error),
            };
            results.push(result.map_err(Arc::new));
        }
        results
    }

    async fn send_request(
        &self,
        change: &SquashedLocalChange,
        request: &UrlUploadRequest,
    ) -> Result<UploadConfirmation> {
        let response = self.data_source.upload_request(request).await?;
        confirm_response(change, request.verb, Some(&response), None).ok_or_else(|| {
            Error::Upload(format!(
                "{} {} was not confirmed by the server",
                request.verb, request.url
            ))
        })
    }
}

fn confirm_entry(
    change: &SquashedLocalChange,
    verb: HttpVerb,
    entry: &BundleEntry,
) -> ChangeResult {
    let response = entry.response.as_ref();
    let status_ok = response.is_some_and(|response| response.is_success());
    let rejected = || {
        let status = response.map_or("no status", |response| response.status.as_str());
        Arc::new(Error::Upload(format!(
            "{} not confirmed in transaction-response ({status})",
            change.key()
        )))
    };
    if response.is_some() && !status_ok {
        return Err(rejected());
    }

    let confirmation = confirm_response(change, verb, entry.resource.as_ref(), Some(status_ok))
        .ok_or_else(rejected)?;

    // a POST answered without a body names the new id in its location
    let server_id = confirmation.server_id.or_else(|| {
        if verb != HttpVerb::Post {
            return None;
        }
        let key = ResourceKey::from_reference(response?.location.as_deref()?)?;
        (key.resource_type == change.local_change.resource_type).then_some(key.id)
    });

    // fall back to the entry's response metadata when the body had none
    Ok(UploadConfirmation {
        server_id,
        version_id: confirmation
            .version_id
            .or_else(|| response.and_then(BundleResponse::etag_version)),
        last_updated: confirmation
            .last_updated
            .or_else(|| response.and_then(|response| response.last_modified.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetchMode, InsertVerb};
    use crate::models::{LocalChangeType, Resource};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

    /// Records what was sent and answers with a canned responder.
    struct FakeDataSource {
        sent: Mutex<Vec<Value>>,
        respond: Responder,
    }

    impl FakeDataSource {
        fn new(respond: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn sent(&self) -> Vec<Value> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DataSource for FakeDataSource {
        async fn download(&self, _url: &str) -> Result<Value> {
            Err(Error::Upload("download not expected".into()))
        }

        async fn upload_bundle(&self, bundle: &Bundle) -> Result<Value> {
            let value = serde_json::to_value(bundle)?;
            self.sent.lock().unwrap().push(value.clone());
            (self.respond)(&value)
        }

        async fn upload_request(&self, request: &UrlUploadRequest) -> Result<Value> {
            let value = json!({
                "verb": request.verb.as_str(),
                "url": request.url,
                "body": request.body,
                "if_match": request.if_match,
            });
            self.sent.lock().unwrap().push(value.clone());
            (self.respond)(&value)
        }
    }

    /// Echo every entry back with a 2xx response and a version.
    fn echo_transaction(request: &Value) -> Result<Value> {
        let entries: Vec<Value> = request["entry"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| {
                        let mut resource = entry["resource"].clone();
                        if resource["resourceType"] == "Binary" {
                            let url = entry["request"]["url"].as_str().unwrap_or_default();
                            let (resource_type, id) = url.split_once('/').unwrap_or_default();
                            resource = json!({"resourceType": resource_type, "id": id});
                        }
                        if resource.is_object() {
                            resource["meta"] = json!({"versionId": "2", "lastUpdated": "2024-05-01T00:00:00Z"});
                            json!({"resource": resource, "response": {"status": "200 OK"}})
                        } else {
                            json!({"response": {"status": "204 No Content"}})
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({"resourceType": "Bundle", "type": "transaction-response", "entry": entries}))
    }

    fn patient(id: &str, active: bool) -> Resource {
        Resource::from_value(json!({"resourceType": "Patient", "id": id, "active": active})).unwrap()
    }

    async fn seeded_store() -> FhirStore {
        let store = FhirStore::open_in_memory().await.unwrap();
        store.insert(vec![patient("p-1", true)]).await.unwrap();
        store
            .insert_remote(vec![patient("p-2", true), patient("p-3", true)])
            .await
            .unwrap();
        store.update(patient("p-2", false)).await.unwrap();
        store.delete("Patient", "p-3").await.unwrap();
        store
    }

    fn bundle_mode() -> UploadMode {
        UploadMode::Bundle {
            insert_verb: InsertVerb::Put,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bundle_upload_confirms_and_clears_log() {
        let store = seeded_store().await;
        let source = FakeDataSource::new(echo_transaction);
        let uploader = Uploader::new(store.clone(), source.clone(), bundle_mode());
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerBatch { size: 10 });

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 3 }));
        assert_eq!(store.count_local_changes().await.unwrap(), 0);

        let sent = source.sent();
        assert_eq!(sent.len(), 1);
        let methods: Vec<_> = sent[0]["entry"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["request"]["method"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(methods, vec!["PUT", "PATCH", "DELETE"]);

        // uploaded resources stay in the store; the deleted one stays gone
        assert_eq!(store.select("Patient", "p-1").await.unwrap().id(), Some("p-1"));
        assert!(store.select("Patient", "p-3").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn information_only_outcome_counts_as_success() {
        let store = seeded_store().await;
        let source = FakeDataSource::new(|_| {
            Ok(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "information", "code": "informational"}]
            }))
        });
        let uploader = Uploader::new(store.clone(), source, bundle_mode());
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerBatch { size: 10 });

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 3 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_bundle_fails_every_change_once() {
        let store = seeded_store().await;
        let source = FakeDataSource::new(|_| {
            Ok(json!({
                "resourceType": "OperationOutcome",
                "issue": [{"severity": "error", "code": "conflict", "diagnostics": "version conflict"}]
            }))
        });
        let uploader = Uploader::new(store.clone(), source.clone(), bundle_mode());
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerBatch { size: 10 });

        let UploadSyncResult::Error(errors) = uploader.upload(&mut fetcher).await.unwrap() else {
            panic!("expected upload errors");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.resource_type == "Patient"));
        assert!(errors[0].to_string().contains("version conflict"));

        // skipped resources are not re-sent within the pass
        assert_eq!(source.sent().len(), 1);
        assert_eq!(store.count_local_changes().await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn entry_count_mismatch_fails_batch() {
        let store = seeded_store().await;
        let source = FakeDataSource::new(|_| {
            Ok(json!({"resourceType": "Bundle", "type": "transaction-response", "entry": []}))
        });
        let uploader = Uploader::new(store.clone(), source, bundle_mode());
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerBatch { size: 10 });

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Error(errors) if errors.len() == 3));
        assert_eq!(store.count_local_changes().await.unwrap(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_failure_does_not_block_others() {
        let store = seeded_store().await;
        // fail only the PATCH of p-2
        let source = FakeDataSource::new(|request| {
            if request["url"] == "Patient/p-2" {
                return Err(Error::Server {
                    status: 412,
                    message: "precondition failed".into(),
                });
            }
            match request["verb"].as_str() {
                Some("DELETE") => Ok(Value::Null),
                _ => Ok(request["body"].clone()),
            }
        });
        let uploader = Uploader::new(
            store.clone(),
            source,
            UploadMode::Individual {
                insert_verb: InsertVerb::Put,
            },
        );
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerResource);

        let UploadSyncResult::Error(errors) = uploader.upload(&mut fetcher).await.unwrap() else {
            panic!("expected upload errors");
        };
        assert_eq!(errors.len(), 1);

        let remaining = store.all_local_changes().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].resource_id, "p-2");
        assert_eq!(remaining[0].change_type, LocalChangeType::Update);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transport_error_keeps_changes() {
        let store = seeded_store().await;
        let source = FakeDataSource::new(|_| {
            Err(Error::Server {
                status: 503,
                message: "unavailable".into(),
            })
        });
        let uploader = Uploader::new(store.clone(), source, bundle_mode());
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerResource);

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Error(errors) if errors.len() == 3));
        assert_eq!(store.count_local_changes().await.unwrap(), 3);
    }

    fn individual(insert_verb: InsertVerb) -> UploadMode {
        UploadMode::Individual { insert_verb }
    }

    /// Answer POSTs with a server-assigned `srv-<local id>` and echo the rest.
    fn assign_server_ids(request: &Value) -> Result<Value> {
        let mut body = request["body"].clone();
        match request["verb"].as_str() {
            Some("POST") => {
                let local_id = body["id"].as_str().unwrap_or_default().to_string();
                body["id"] = json!(format!("srv-{local_id}"));
                body["meta"] = json!({"versionId": "1"});
                Ok(body)
            }
            Some("PATCH") => {
                let (resource_type, id) = request["url"].as_str().unwrap().split_once('/').unwrap();
                Ok(json!({"resourceType": resource_type, "id": id}))
            }
            _ => Ok(Value::Null),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_insert_adopts_server_id() {
        let store = FhirStore::open_in_memory().await.unwrap();
        let observation = Resource::from_value(json!({
            "resourceType": "Observation",
            "id": "o-1",
            "subject": {"reference": "Patient/p-1"}
        }))
        .unwrap();
        store.insert(vec![observation]).await.unwrap();
        store.insert(vec![patient("p-1", true)]).await.unwrap();

        let source = FakeDataSource::new(assign_server_ids);
        let uploader = Uploader::new(store.clone(), source.clone(), individual(InsertVerb::Post));
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerResource);
        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 2 }));

        // the patient goes first and the observation is sent with its new id
        let sent = source.sent();
        assert_eq!(sent[0]["url"], "Patient");
        assert_eq!(sent[1]["url"], "Observation");
        assert_eq!(sent[1]["body"]["subject"]["reference"], "Patient/srv-p-1");

        assert!(store.select("Patient", "p-1").await.is_err());
        let stored = store.select("Patient", "srv-p-1").await.unwrap();
        assert_eq!(stored.id(), Some("srv-p-1"));
        assert!(store.select("Observation", "srv-o-1").await.is_ok());
        assert_eq!(store.count_local_changes().await.unwrap(), 0);

        // a later edit targets the server id
        store.update(patient("srv-p-1", false)).await.unwrap();
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerResource);
        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 1 }));
        let sent = source.sent();
        assert_eq!(sent[2]["verb"], "PATCH");
        assert_eq!(sent[2]["url"], "Patient/srv-p-1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn post_entry_location_names_server_id() {
        let store = FhirStore::open_in_memory().await.unwrap();
        store.insert(vec![patient("p-1", true)]).await.unwrap();
        let source = FakeDataSource::new(|_| {
            Ok(json!({
                "resourceType": "Bundle",
                "type": "transaction-response",
                "entry": [{"response": {"status": "201 Created", "location": "Patient/srv-9/_history/1"}}]
            }))
        });
        let uploader = Uploader::new(
            store.clone(),
            source,
            UploadMode::Bundle {
                insert_verb: InsertVerb::Post,
            },
        );
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerResource);

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 1 }));
        assert!(store.select("Patient", "srv-9").await.is_ok());
        assert!(store.select("Patient", "p-1").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn per_change_mode_uploads_each_row_separately() {
        let store = FhirStore::open_in_memory().await.unwrap();
        store.insert(vec![patient("p-1", true)]).await.unwrap();
        store.update(patient("p-1", false)).await.unwrap();
        store.delete("Patient", "p-1").await.unwrap();

        let source = FakeDataSource::new(|request| match request["verb"].as_str() {
            Some("PATCH") => Ok(json!({"resourceType": "Patient", "id": "p-1"})),
            Some("DELETE") => Ok(Value::Null),
            _ => Ok(request["body"].clone()),
        });
        let uploader = Uploader::new(store.clone(), source.clone(), individual(InsertVerb::Put));
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerChange);

        let result = uploader.upload(&mut fetcher).await.unwrap();
        assert!(matches!(result, UploadSyncResult::Success { uploaded: 3 }));

        let verbs: Vec<_> = source
            .sent()
            .iter()
            .map(|request| request["verb"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(verbs, vec!["PUT", "PATCH", "DELETE"]);
        assert_eq!(store.count_local_changes().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn etag_flag_pins_updates_to_stored_version() {
        let store = FhirStore::open_in_memory().await.unwrap();
        let remote = Resource::from_value(json!({
            "resourceType": "Patient",
            "id": "p-2",
            "meta": {"versionId": "2"},
            "active": true
        }))
        .unwrap();
        store.insert_remote(vec![remote]).await.unwrap();
        store.update(patient("p-2", false)).await.unwrap();
        store.insert(vec![patient("p-1", true)]).await.unwrap();

        let source = FakeDataSource::new(echo_transaction);
        let uploader =
            Uploader::new(store.clone(), source.clone(), bundle_mode()).with_etag_for_upload(true);
        let mut fetcher = LocalChangeFetcher::new(store.clone(), FetchMode::PerBatch { size: 10 });
        uploader.upload(&mut fetcher).await.unwrap();

        let sent = source.sent();
        let requests: Vec<_> = sent[0]["entry"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["request"].clone())
            .collect();
        assert_eq!(requests[0]["method"], "PATCH");
        assert_eq!(requests[0]["ifMatch"], "W/\"2\"");
        assert_eq!(requests[1]["method"], "PUT");
        assert!(requests[1].get("ifMatch").is_none());
    }

    #[test]
    fn confirm_entry_uses_response_metadata() {
        let change = SquashedLocalChange {
            token: crate::models::LocalChangeToken::new(vec![1]),
            local_change: crate::models::LocalChange {
                resource_type: "Patient".into(),
                resource_id: "p-1".into(),
                timestamp: "2024-01-01T00:00:00.000Z".into(),
                change_type: LocalChangeType::Delete,
                payload: String::new(),
                version_id: None,
                token: crate::models::LocalChangeToken::new(vec![1]),
            },
        };
        let entry: BundleEntry = serde_json::from_value(json!({
            "response": {"status": "204 No Content", "etag": "W/\"7\"", "lastModified": "2024-05-01T00:00:00Z"}
        }))
        .unwrap();
        let confirmation = confirm_entry(&change, HttpVerb::Delete, &entry).unwrap();
        assert_eq!(confirmation.version_id.as_deref(), Some("7"));
        assert_eq!(confirmation.last_updated.as_deref(), Some("2024-05-01T00:00:00Z"));

        let failed: BundleEntry =
            serde_json::from_value(json!({"response": {"status": "409 Conflict"}})).unwrap();
        assert!(confirm_entry(&change, HttpVerb::Delete, &failed).is_err());
    }
}
