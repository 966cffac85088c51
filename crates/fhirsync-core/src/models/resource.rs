//! FHIR resource wrapper

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Identifies one stored resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub resource_type: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// Parse a relative or absolute literal reference such as `Patient/p-1`,
    /// `https://example.org/fhir/Patient/p-1` or `Patient/p-1/_history/2`.
    ///
    /// Contained (`#x`) and `urn:` references have no key.
    pub fn from_reference(reference: &str) -> Option<Self> {
        if reference.starts_with('#') || reference.starts_with("urn:") {
            return None;
        }
        let path = reference.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let end = match segments.iter().rposition(|s| *s == "_history") {
            Some(history) => history,
            None => segments.len(),
        };
        if end < 2 {
            return None;
        }
        let (resource_type, id) = (segments[end - 2], segments[end - 1]);
        resource_type
            .starts_with(|c: char| c.is_ascii_uppercase())
            .then(|| Self::new(resource_type, id))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.id)
    }
}

/// A FHIR resource held as its JSON representation.
///
/// Only the handful of elements the sync engine needs (`resourceType`, `id`,
/// `meta.versionId`, `meta.lastUpdated`) are interpreted; everything else is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Resource(Value);

impl Resource {
    /// Wrap a JSON value, requiring an object with a string `resourceType`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value.get("resourceType") {
            Some(Value::String(resource_type)) if !resource_type.is_empty() => Ok(Self(value)),
            _ => Err(Error::InvalidInput(
                "resource must be a JSON object with a resourceType".into(),
            )),
        }
    }

    /// Parse a resource from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn resource_type(&self) -> &str {
        self.0
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn id(&self) -> Option<&str> {
        self.0
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Set the logical id, replacing any existing one.
    pub fn set_id(&mut self, id: impl Into<String>) {
        if let Value::Object(map) = &mut self.0 {
            map.insert("id".into(), Value::String(id.into()));
        }
    }

    /// `meta.versionId`
    pub fn version_id(&self) -> Option<&str> {
        self.0.pointer("/meta/versionId").and_then(Value::as_str)
    }

    /// `meta.lastUpdated`
    pub fn last_updated(&self) -> Option<&str> {
        self.0.pointer("/meta/lastUpdated").and_then(Value::as_str)
    }

    /// Key for this resource; fails when the resource has no id.
    pub fn key(&self) -> Result<ResourceKey> {
        let id = self.id().ok_or_else(|| {
            Error::InvalidInput(format!("{} resource has no id", self.resource_type()))
        })?;
        Ok(ResourceKey::new(self.resource_type(), id))
    }

    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Compact JSON encoding used for storage and change payloads.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }
}

impl TryFrom<Value> for Resource {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Resource> for Value {
    fn from(resource: Resource) -> Self {
        resource.0
    }
}
