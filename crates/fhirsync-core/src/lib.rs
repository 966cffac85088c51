//! fhirsync-core - Core library for fhirsync
//!
//! Offline-first storage for FHIR resources. Every local mutation is recorded
//! in an append-only change log; pending changes are squashed per resource,
//! batched into upload payloads and reconciled against the server, while
//! downloaded pages are merged through a pluggable conflict resolver.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod patch;
pub mod references;
pub mod services;
pub mod squash;
pub mod sync;
pub mod util;

pub use error::{Error, ResourceSyncError, Result};
pub use models::{
    LocalChange, LocalChangeEntity, LocalChangeToken, LocalChangeType, Resource, ResourceKey,
    SquashedLocalChange,
};
pub use services::FhirStore;
