//! Upload payload generation from squashed local changes

use serde_json::Value;

use crate::config::InsertVerb;
use crate::error::Result;
use crate::models::{
    Bundle, BundleEntry, BundleRequest, BundleType, HttpVerb, LocalChange, LocalChangeToken,
    LocalChangeType, SquashedLocalChange, patch_binary,
};
use crate::patch::parse_patch;

/// One standalone HTTP request uploading a single resource's net change.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlUploadRequest {
    pub verb: HttpVerb,
    /// Relative URL, e.g. `Patient/p-1` or `Patient` for a POST
    pub url: String,
    pub body: Option<Value>,
    /// Value for the `If-Match` header
    pub if_match: Option<String>,
    pub token: LocalChangeToken,
    pub resource_type: String,
    pub resource_id: String,
}

fn request_target(change: &LocalChange, insert_verb: InsertVerb) -> (HttpVerb, String) {
    let instance_url = format!("{}/{}", change.resource_type, change.resource_id);
    match change.change_type {
        LocalChangeType::Insert => match insert_verb {
            InsertVerb::Put => (HttpVerb::Put, instance_url),
            InsertVerb::Post => (HttpVerb::Post, change.resource_type.clone()),
        },
        LocalChangeType::Update => (HttpVerb::Patch, instance_url),
        LocalChangeType::Delete => (HttpVerb::Delete, instance_url),
    }
}

// An INSERT has no server version to match; UPDATE and DELETE are pinned to
// the version they were made against when one is known.
fn if_match(change: &LocalChange, use_etag: bool) -> Option<String> {
    if !use_etag || change.change_type == LocalChangeType::Insert {
        return None;
    }
    change
        .version_id
        .as_deref()
        .filter(|version| !version.is_empty())
        .map(|version| format!("W/\"{version}\""))
}

/// Builds FHIR `transaction` bundles, one per batch of changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionBundleGenerator {
    insert_verb: InsertVerb,
    use_etag: bool,
}

impl TransactionBundleGenerator {
    pub const fn new(insert_verb: InsertVerb) -> Self {
        Self {
            insert_verb,
            use_etag: false,
        }
    }

    #[must_use]
    pub const fn with_etag(mut self, use_etag: bool) -> Self {
        self.use_etag = use_etag;
        self
    }

    /// One bundle per non-empty batch, entries in input order, paired with
    /// the tokens of the changes it carries.
    pub fn generate(
        &self,
        batches: &[Vec<SquashedLocalChange>],
    ) -> Result<Vec<(Bundle, Vec<LocalChangeToken>)>> {
        batches
            .iter()
            .filter(|batch| !batch.is_empty())
            .map(|batch| self.generate_bundle(batch))
            .collect()
    }

    fn generate_bundle(
        &self,
        batch: &[SquashedLocalChange],
    ) -> Result<(Bundle, Vec<LocalChangeToken>)> {
        let mut bundle = Bundle::new(BundleType::Transaction);
        let mut tokens = Vec::with_capacity(batch.len());
        for change in batch {
            bundle.entry.push(self.entry(&change.local_change)?);
            tokens.push(change.token.clone());
        }
        Ok((bundle, tokens))
    }

    fn entry(&self, change: &LocalChange) -> Result<BundleEntry> {
        let (method, url) = request_target(change, self.insert_verb);
        let resource = match change.change_type {
            LocalChangeType::Insert => Some(serde_json::from_str(&change.payload)?),
            // validate before wrapping so a corrupt payload fails here, not on the server
            LocalChangeType::Update => {
                parse_patch(&change.payload)?;
                Some(patch_binary(&change.payload))
            }
            LocalChangeType::Delete => None,
        };
        Ok(BundleEntry {
            resource,
            request: Some(BundleRequest {
                method,
                url,
                if_match: if_match(change, self.use_etag),
            }),
            ..BundleEntry::default()
        })
    }
}

/// Builds one [`UrlUploadRequest`] per change.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndividualRequestGenerator {
    insert_verb: InsertVerb,
    use_etag: bool,
}

impl IndividualRequestGenerator {
    pub const fn new(insert_verb: InsertVerb) -> Self {
        Self {
            insert_verb,
            use_etag: false,
        }
    }

    #[must_use]
    pub const fn with_etag(mut self, use_etag: bool) -> Self {
        self.use_etag = use_etag;
        self
    }

    pub fn generate(&self, changes: &[SquashedLocalChange]) -> Result<Vec<UrlUploadRequest>> {
        changes.iter().map(|change| self.request(change)).collect()
    }

    fn request(&self, squashed: &SquashedLocalChange) -> Result<UrlUploadRequest> {
        let change = &squashed.local_change;
        let (verb, url) = request_target(change, self.insert_verb);
        let body = match change.change_type {
            LocalChangeType::Insert | LocalChangeType::Update => {
                Some(serde_json::from_str(&change.payload)?)
            }
            LocalChangeType::Delete => None,
        };
        Ok(UrlUploadRequest {
            verb,
            url,
            body,
            if_match: if_match(change, self.use_etag),
            token: squashed.token.clone(),
            resource_type: change.resource_type.clone(),
            resource_id: change.resource_id.clone(),
        })
    }
}
