//! FHIR Bundle and OperationOutcome shapes used on the wire

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Content type of a `Binary` carrying a JSON patch.
pub const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

/// HTTP verb of a bundle entry or standalone upload request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl HttpVerb {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleType {
    Transaction,
    TransactionResponse,
    Batch,
    BatchResponse,
    Searchset,
    History,
    Collection,
    Document,
    Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    pub method: HttpVerb,
    pub url: String,
    /// Weak ETag of the version the change was made against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,
}

impl BundleResponse {
    /// Leading status code, e.g. `201` from `"201 Created"`.
    pub fn status_code(&self) -> Option<u16> {
        self.status.split_whitespace().next()?.parse().ok()
    }

    pub fn is_success(&self) -> bool {
        self.status_code().is_some_and(|code| (200..300).contains(&code))
    }

    /// Version from a weak etag such as `W/"3"`.
    pub fn etag_version(&self) -> Option<String> {
        let etag = self.etag.as_deref()?;
        let version = etag.trim_start_matches("W/").trim_matches('"');
        (!version.is_empty()).then(|| version.to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// A FHIR Bundle; unknown elements are dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default = "bundle_resource_type")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    /// Match count of a searchset, e.g. from `_summary=count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,
}

fn bundle_resource_type() -> String {
    "Bundle".to_string()
}

impl Bundle {
    pub fn new(bundle_type: BundleType) -> Self {
        Self {
            resource_type: bundle_resource_type(),
            bundle_type,
            total: None,
            entry: Vec::new(),
            link: Vec::new(),
        }
    }

    /// Parse a JSON value as a Bundle, returning `None` for anything else.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// URL of the link with the given relation, if any.
    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|link| link.relation == relation)
            .map(|link| link.url.as_str())
    }

    /// Resources carried by the entries, skipping entries without one.
    pub fn resources(&self) -> impl Iterator<Item = &Value> {
        self.entry.iter().filter_map(|entry| entry.resource.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    #[serde(default)]
    pub issue: Vec<OperationOutcomeIssue>,
}

impl OperationOutcome {
    /// Parse a JSON value as an OperationOutcome, returning `None` for
    /// anything else.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.get("resourceType").and_then(Value::as_str) != Some("OperationOutcome") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// True when there is at least one issue and every issue is informational.
    pub fn is_all_information(&self) -> bool {
        !self.issue.is_empty()
            && self
                .issue
                .iter()
                .all(|issue| issue.severity == IssueSeverity::Information)
    }

    /// Diagnostics of all issues joined into one message.
    pub fn diagnostics(&self) -> String {
        self.issue
            .iter()
            .filter_map(|issue| issue.diagnostics.as_deref())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Wrap a JSON patch in a `Binary` resource for a transaction entry.
pub fn patch_binary(patch_json: &str) -> Value {
    json!({
        "resourceType": "Binary",
        "contentType": JSON_PATCH_CONTENT_TYPE,
        "data": STANDARD.encode(patch_json.as_bytes()),
    })
}
