//! Remote FHIR server access

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, IF_MATCH};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{Bundle, HttpVerb, JSON_PATCH_CONTENT_TYPE, OperationOutcome};
use crate::util::{compact_text, is_http_url};

use super::request::UrlUploadRequest;

const FHIR_JSON: &str = "application/fhir+json";

/// Transport to a FHIR server.
///
/// Implementations return the parsed response body for any 2xx status and an
/// error otherwise. An empty 2xx body is returned as `Value::Null`.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// GET a search or paging URL, relative to the base URL or absolute.
    async fn download(&self, url: &str) -> Result<Value>;

    /// POST a transaction bundle to the base URL.
    async fn upload_bundle(&self, bundle: &Bundle) -> Result<Value>;

    /// Send one standalone request.
    async fn upload_request(&self, request: &UrlUploadRequest) -> Result<Value>;
}

/// [`DataSource`] over HTTP with `reqwest`.
#[derive(Clone)]
pub struct HttpDataSource {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpDataSource {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpDataSource")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpDataSource {
    /// Build a client from a validated configuration.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let config = config.clone().validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            base_url: config.base_url,
            auth_token: config.auth_token,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve_url(&self, url: &str) -> String {
        if is_http_url(url) {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.resolve_url(url))
            .header(ACCEPT, FHIR_JSON);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                message: parse_server_error(status, &body),
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn method_for(verb: HttpVerb) -> Method {
    match verb {
        HttpVerb::Get => Method::GET,
        HttpVerb::Put => Method::PUT,
        HttpVerb::Post => Method::POST,
        HttpVerb::Patch => Method::PATCH,
        HttpVerb::Delete => Method::DELETE,
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn download(&self, url: &str) -> Result<Value> {
        tracing::debug!("GET {url}");
        self.send(self.request(Method::GET, url)).await
    }

    async fn upload_bundle(&self, bundle: &Bundle) -> Result<Value> {
        tracing::debug!("POST transaction bundle with {} entries", bundle.entry.len());
        let builder = self
            .request(Method::POST, "")
            .header(CONTENT_TYPE, FHIR_JSON)
            .body(serde_json::to_vec(bundle)?);
        self.send(builder).await
    }

    async fn upload_request(&self, request: &UrlUploadRequest) -> Result<Value> {
        tracing::debug!("{} {}", request.verb, request.url);
        let mut builder = self.request(method_for(request.verb), &request.url);
        if let Some(if_match) = &request.if_match {
            builder = builder.header(IF_MATCH, if_match);
        }
        if let Some(body) = &request.body {
            let content_type = if request.verb == HttpVerb::Patch {
                JSON_PATCH_CONTENT_TYPE
            } else {
                FHIR_JSON
            };
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .body(serde_json::to_vec(body)?);
        }
        self.send(builder).await
    }
}

/// Build an error message from an OperationOutcome, the raw body, or the status.
fn parse_server_error(status: StatusCode, body: &str) -> String {
    if let Some(outcome) = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(OperationOutcome::from_value)
    {
        let diagnostics = outcome.diagnostics();
        if !diagnostics.is_empty() {
            return format!("{} ({})", diagnostics, status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
