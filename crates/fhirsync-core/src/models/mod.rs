//! Data models for fhirsync

mod bundle;
mod entity;
mod local_change;
mod resource;

pub use bundle::{
    Bundle, BundleEntry, BundleLink, BundleRequest, BundleResponse, BundleType, HttpVerb,
    IssueSeverity, JSON_PATCH_CONTENT_TYPE, OperationOutcome, OperationOutcomeIssue,
    patch_binary,
};
pub use entity::ResourceEntity;
pub use local_change::{
    LocalChange, LocalChangeEntity, LocalChangeToken, LocalChangeType, SquashedLocalChange,
};
pub use resource::{Resource, ResourceKey};
