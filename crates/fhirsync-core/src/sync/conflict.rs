//! Conflict resolution between downloaded resources and pending local edits

use crate::models::Resource;

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Store this resource and upload its difference from the remote version
    Resolved(Resource),
    /// Delete the resource locally and upload the deletion
    Delete,
    /// Leave the local state and its pending changes untouched
    Unresolved,
}

/// Decides what to keep when a downloaded resource has pending local changes.
///
/// `local` is the current local state, or `None` when the resource was
/// deleted locally. Called once per conflicting resource per downloaded page,
/// inside the page's transaction, so it must not block.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: Option<&Resource>, remote: &Resource) -> ConflictResolution;
}

impl<F> ConflictResolver for F
where
    F: Fn(Option<&Resource>, &Resource) -> ConflictResolution + Send + Sync,
{
    fn resolve(&self, local: Option<&Resource>, remote: &Resource) -> ConflictResolution {
        self(local, remote)
    }
}

/// Keeps the local version; a local deletion stays a deletion.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptLocalConflictResolver;

impl ConflictResolver for AcceptLocalConflictResolver {
    fn resolve(&self, local: Option<&Resource>, _remote: &Resource) -> ConflictResolution {
        local.map_or(ConflictResolution::Delete, |local| {
            ConflictResolution::Resolved(local.clone())
        })
    }
}

/// Keeps the server version and drops the local changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptRemoteConflictResolver;

impl ConflictResolver for AcceptRemoteConflictResolver {
    fn resolve(&self, _local: Option<&Resource>, remote: &Resource) -> ConflictResolution {
        ConflictResolution::Resolved(remote.clone())
    }
}
