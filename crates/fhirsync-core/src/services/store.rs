//! Shared resource store used by clients and the sync engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{
    Database, LAST_SYNC_TIMESTAMP, LibSqlLocalChangeRepository, LibSqlResourceRepository,
    LibSqlSyncStateRepository, LocalChangeRepository, ResourceRepository, SyncStateRepository,
};
use crate::error::{Error, Result};
use crate::models::{
    LocalChangeEntity, LocalChangeToken, LocalChangeType, Resource, ResourceEntity, ResourceKey,
    SquashedLocalChange,
};
use crate::patch::{Differ, JsonPatchDiffer};
use crate::references::{order_by_references, replace_reference};
use crate::squash::{squash, squash_all};
use crate::sync::{ConflictResolution, ConflictResolver, UploadConfirmation};

/// Thread-safe handle to the local resource database.
///
/// Every mutation runs in its own `BEGIN IMMEDIATE` transaction and records
/// the matching local change, so the resource table and the change log never
/// disagree.
#[derive(Clone)]
pub struct FhirStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    differ: Arc<dyn Differ>,
}

impl std::fmt::Debug for FhirStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("FhirStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl FhirStore {
    /// Open a store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened resource store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
            differ: Arc::new(JsonPatchDiffer),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
            differ: Arc::new(JsonPatchDiffer),
        })
    }

    /// Path of the backing database file, if on disk.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Insert new local resources and record an INSERT for each.
    ///
    /// Resources without an id get a fresh UUIDv7. Returns the ids in input
    /// order.
    pub async fn insert(&self, resources: Vec<Resource>) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self.insert_in(db.connection(), resources).await;
        db.finish(result).await
    }

    async fn insert_in(&self, conn: &Connection, resources: Vec<Resource>) -> Result<Vec<String>> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());

        let mut ids = Vec::with_capacity(resources.len());
        for mut resource in resources {
            if resource.id().is_none() {
                resource.set_id(Uuid::now_v7().to_string());
            }
            change_repo.add_insert(&resource).await?;
            resource_repo
                .upsert(&ResourceEntity::from_resource(&resource)?)
                .await?;
            let key = resource.key()?;
            tracing::debug!("Inserted {key}");
            ids.push(key.id);
        }
        Ok(ids)
    }

    /// Replace a stored resource and record an UPDATE with the difference.
    pub async fn update(&self, resource: Resource) -> Result<()> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self.update_in(db.connection(), &resource).await;
        db.finish(result).await
    }

    async fn update_in(&self, conn: &Connection, resource: &Resource) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());

        let key = resource.key()?;
        let existing = resource_repo
            .get(&key.resource_type, &key.id)
            .await?
            .ok_or_else(|| Error::not_found(&key.resource_type, &key.id))?;

        change_repo
            .add_update(&existing.resource()?, resource)
            .await?;

        // server version metadata tracks the last synced state, not local edits
        let entity = ResourceEntity {
            payload: resource.to_json()?,
            ..existing
        };
        resource_repo.upsert(&entity).await
    }

    /// Delete a stored resource and record a DELETE. Absent resources are a no-op.
    pub async fn delete(&self, resource_type: &str, resource_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self.delete_in(db.connection(), resource_type, resource_id).await;
        db.finish(result).await
    }

    async fn delete_in(&self, conn: &Connection, resource_type: &str, resource_id: &str) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());

        if resource_repo.get(resource_type, resource_id).await?.is_none() {
            tracing::debug!("Delete of absent {resource_type}/{resource_id} ignored");
            return Ok(());
        }
        change_repo.add_delete(resource_type, resource_id).await?;
        resource_repo.delete(resource_type, resource_id).await?;
        Ok(())
    }

    /// Load a stored resource.
    pub async fn select(&self, resource_type: &str, resource_id: &str) -> Result<Resource> {
        let db = self.db.lock().await;
        let repo = LibSqlResourceRepository::new(db.connection());
        repo.get(resource_type, resource_id)
            .await?
            .ok_or_else(|| Error::not_found(resource_type, resource_id))?
            .resource()
    }

    /// Store server resources as-is, without recording local changes.
    pub async fn insert_remote(&self, resources: Vec<Resource>) -> Result<()> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = Self::insert_remote_in(db.connection(), &resources).await;
        db.finish(result).await
    }

    async fn insert_remote_in(conn: &Connection, resources: &[Resource]) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let state_repo = LibSqlSyncStateRepository::new(conn);
        for resource in resources {
            resource_repo
                .upsert(&ResourceEntity::from_resource(resource)?)
                .await?;
            if let Some(last_updated) = resource.last_updated() {
                state_repo
                    .record_last_updated(resource.resource_type(), last_updated)
                    .await?;
            }
        }
        Ok(())
    }

    /// Local change log entries for one resource, oldest first.
    pub async fn local_changes(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<LocalChangeEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        repo.local_changes(resource_type, resource_id).await
    }

    /// Every local change log entry, oldest first.
    pub async fn all_local_changes(&self) -> Result<Vec<LocalChangeEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        repo.all_local_changes().await
    }

    /// Row id and resource of every pending change, oldest first.
    pub async fn local_change_keys(&self) -> Result<Vec<(i64, ResourceKey)>> {
        let db = self.db.lock().await;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        repo.change_keys().await
    }

    /// One local change log entry by row id.
    pub async fn local_change(&self, id: i64) -> Result<Option<LocalChangeEntity>> {
        let db = self.db.lock().await;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        repo.get(id).await
    }

    /// Pending changes squashed per resource.
    ///
    /// Resources are ordered by their oldest change, except that a resource
    /// created locally comes before every change that references it.
    pub async fn squashed_local_changes(&self) -> Result<Vec<SquashedLocalChange>> {
        let entries = self.all_local_changes().await?;
        order_by_references(squash_all(self.differ.as_ref(), entries)?)
    }

    /// Pending changes of one resource squashed into one, if any.
    pub async fn squashed_local_change(&self, key: &ResourceKey) -> Result<Option<SquashedLocalChange>> {
        let entries = self.local_changes(&key.resource_type, &key.id).await?;
        if entries.is_empty() {
            return Ok(None);
        }
        let local_change = squash(self.differ.as_ref(), entries)?;
        Ok(Some(SquashedLocalChange {
            token: local_change.token.clone(),
            local_change,
        }))
    }

    /// Remove exactly the log rows named by `token`.
    pub async fn delete_updates(&self, token: &LocalChangeToken) -> Result<u64> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        let result = repo.delete_token(token).await;
        db.finish(result).await
    }

    /// Number of pending local change log entries.
    pub async fn count_local_changes(&self) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlLocalChangeRepository::new(db.connection(), self.differ.as_ref());
        repo.count().await
    }

    /// Remove a resource and its change history without recording a DELETE.
    ///
    /// Refuses when local changes are pending unless `force` is set.
    pub async fn purge(&self, resource_type: &str, resource_id: &str, force: bool) -> Result<()> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self
            .purge_in(db.connection(), resource_type, resource_id, force)
            .await;
        db.finish(result).await
    }

    async fn purge_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        resource_id: &str,
        force: bool,
    ) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());

        let pending = change_repo.local_changes(resource_type, resource_id).await?;
        if !pending.is_empty() && !force {
            return Err(Error::InvalidLocalChange(format!(
                "{resource_type}/{resource_id} has {} pending local change(s); use force to purge",
                pending.len()
            )));
        }

        let removed = resource_repo.delete(resource_type, resource_id).await?;
        if !removed && pending.is_empty() {
            return Err(Error::not_found(resource_type, resource_id));
        }
        change_repo.discard(resource_type, resource_id).await?;
        tracing::info!("Purged {resource_type}/{resource_id}");
        Ok(())
    }

    /// Newest `meta.lastUpdated` downloaded for a resource type.
    pub async fn last_update(&self, resource_type: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.last_updated(resource_type).await
    }

    /// Record server version metadata after an upload.
    ///
    /// Returns whether a stored resource was updated.
    pub async fn update_version_id_and_last_updated(
        &self,
        resource_type: &str,
        resource_id: &str,
        version_id: Option<&str>,
        last_updated: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlResourceRepository::new(db.connection());
        repo.update_version(resource_type, resource_id, version_id, last_updated)
            .await
    }

    /// Apply a confirmed upload in one transaction.
    ///
    /// Drops the log rows named by the change's token, moves the resource to
    /// the id the server assigned (if it picked a new one) and records the
    /// confirmed version metadata.
    pub async fn consolidate_upload(
        &self,
        change: &SquashedLocalChange,
        confirmation: &UploadConfirmation,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self
            .consolidate_upload_in(db.connection(), change, confirmation)
            .await;
        db.finish(result).await
    }

    async fn consolidate_upload_in(
        &self,
        conn: &Connection,
        change: &SquashedLocalChange,
        confirmation: &UploadConfirmation,
    ) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());
        change_repo.delete_token(&change.token).await?;

        let local = &change.local_change;
        let resource_id = match confirmation.server_id.as_deref() {
            Some(server_id) if server_id != local.resource_id => {
                self.reassign_id_in(conn, &local.resource_type, &local.resource_id, server_id)
                    .await?;
                server_id
            }
            _ => local.resource_id.as_str(),
        };

        if confirmation.version_id.is_some() || confirmation.last_updated.is_some() {
            resource_repo
                .update_version(
                    &local.resource_type,
                    resource_id,
                    confirmation.version_id.as_deref(),
                    confirmation.last_updated.as_deref(),
                )
                .await?;
        }
        Ok(())
    }

    /// Move a resource to a server-assigned id, along with its pending
    /// changes and every reference to it held locally.
    async fn reassign_id_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        old_id: &str,
        new_id: &str,
    ) -> Result<()> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());

        if let Some(existing) = resource_repo.get(resource_type, old_id).await? {
            let mut resource = existing.resource()?;
            resource.set_id(new_id);
            resource_repo.delete(resource_type, old_id).await?;
            resource_repo
                .upsert(&ResourceEntity {
                    resource_id: new_id.to_string(),
                    payload: resource.to_json()?,
                    ..existing
                })
                .await?;
        }

        change_repo.reassign(resource_type, old_id, new_id).await?;
        for entry in change_repo.local_changes(resource_type, new_id).await? {
            if entry.change_type == LocalChangeType::Insert {
                let mut resource = Resource::from_json(&entry.payload)?;
                resource.set_id(new_id);
                change_repo.set_payload(entry.id, &resource.to_json()?).await?;
            }
        }

        let old_reference = format!("{resource_type}/{old_id}");
        let new_reference = format!("{resource_type}/{new_id}");
        for entity in resource_repo.containing(&old_reference).await? {
            let mut payload: serde_json::Value = serde_json::from_str(&entity.payload)?;
            if replace_reference(&mut payload, &old_reference, &new_reference) {
                resource_repo
                    .upsert(&ResourceEntity {
                        payload: serde_json::to_string(&payload)?,
                        ..entity
                    })
                    .await?;
            }
        }
        for entry in change_repo.containing(&old_reference).await? {
            let mut payload: serde_json::Value = serde_json::from_str(&entry.payload)?;
            if replace_reference(&mut payload, &old_reference, &new_reference) {
                change_repo
                    .set_payload(entry.id, &serde_json::to_string(&payload)?)
                    .await?;
            }
        }

        tracing::info!("Server assigned {new_reference} to {old_reference}");
        Ok(())
    }

    /// Completion time of the last successful sync.
    pub async fn last_sync_timestamp(&self) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.get_value(LAST_SYNC_TIMESTAMP).await
    }

    pub async fn set_last_sync_timestamp(&self, timestamp: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());
        repo.set_value(LAST_SYNC_TIMESTAMP, timestamp).await
    }

    /// Commit one downloaded page, resolving conflicts with pending local changes.
    ///
    /// The whole page is one transaction. Returns the number of conflicts.
    pub async fn save_remote_page(
        &self,
        resources: Vec<Resource>,
        resolver: &dyn ConflictResolver,
    ) -> Result<usize> {
        let db = self.db.lock().await;
        db.begin_immediate().await?;
        let result = self
            .save_remote_page_in(db.connection(), &resources, resolver)
            .await;
        db.finish(result).await
    }

    async fn save_remote_page_in(
        &self,
        conn: &Connection,
        resources: &[Resource],
        resolver: &dyn ConflictResolver,
    ) -> Result<usize> {
        let resource_repo = LibSqlResourceRepository::new(conn);
        let change_repo = LibSqlLocalChangeRepository::new(conn, self.differ.as_ref());
        let state_repo = LibSqlSyncStateRepository::new(conn);

        let pending: HashSet<ResourceKey> = change_repo
            .all_local_changes()
            .await?
            .iter()
            .map(LocalChangeEntity::key)
            .collect();

        let mut resolutions = Vec::new();
        let mut seen = HashSet::new();
        for remote in resources {
            let key = remote.key()?;
            if pending.contains(&key) && seen.insert(key.clone()) {
                let local = resource_repo
                    .get(&key.resource_type, &key.id)
                    .await?
                    .map(|entity| entity.resource())
                    .transpose()?;
                let resolution = resolver.resolve(local.as_ref(), remote);
                resolutions.push((key, remote, resolution));
            }
        }

        let unresolved: HashSet<&ResourceKey> = resolutions
            .iter()
            .filter(|(_, _, resolution)| *resolution == ConflictResolution::Unresolved)
            .map(|(key, _, _)| key)
            .collect();

        for remote in resources {
            let entity = ResourceEntity::from_resource(remote)?;
            if !unresolved.contains(&entity.key()) {
                resource_repo.upsert(&entity).await?;
            }
            if let Some(last_updated) = remote.last_updated() {
                state_repo
                    .record_last_updated(remote.resource_type(), last_updated)
                    .await?;
            }
        }

        for (key, remote, resolution) in &resolutions {
            match resolution {
                ConflictResolution::Resolved(resolved) => {
                    if resolved.key()? != *key {
                        return Err(Error::InvalidInput(format!(
                            "conflict resolver returned a different resource for {key}"
                        )));
                    }
                    change_repo.discard(&key.resource_type, &key.id).await?;
                    let entity = ResourceEntity {
                        payload: resolved.to_json()?,
                        ..ResourceEntity::from_resource(remote)?
                    };
                    resource_repo.upsert(&entity).await?;
                    change_repo.add_update(remote, resolved).await?;
                }
                ConflictResolution::Delete => {
                    // the DELETE is stamped with the remote version stored above
                    change_repo.discard(&key.resource_type, &key.id).await?;
                    change_repo.add_delete(&key.resource_type, &key.id).await?;
                    resource_repo.delete(&key.resource_type, &key.id).await?;
                }
                ConflictResolution::Unresolved => {
                    tracing::debug!("Conflict on {key} left unresolved; keeping local changes");
                }
            }
        }

        if !resolutions.is_empty() {
            tracing::info!(
                "Resolved {} conflict(s) in a page of {} resource(s)",
                resolutions.len(),
                resources.len()
            );
        }
        Ok(resolutions.len())
    }
}
