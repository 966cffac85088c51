//! Local change log repository

use crate::error::{Error, Result};
use crate::models::{LocalChangeEntity, LocalChangeToken, LocalChangeType, Resource, ResourceKey};
use crate::patch::{Differ, patch_to_json};
use crate::util::timestamp_now;
use libsql::Connection;

/// Append-only log of local mutations (async)
#[allow(async_fn_in_trait)]
pub trait LocalChangeRepository {
    /// Record an INSERT carrying the full resource
    async fn add_insert(&self, resource: &Resource) -> Result<()>;

    /// Record an UPDATE carrying `diff(old, new)`; an empty diff records nothing
    async fn add_update(&self, old: &Resource, new: &Resource) -> Result<()>;

    /// Record a DELETE
    async fn add_delete(&self, resource_type: &str, resource_id: &str) -> Result<()>;

    /// Changes for one resource, oldest first
    async fn local_changes(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<LocalChangeEntity>>;

    /// Every pending change, oldest first
    async fn all_local_changes(&self) -> Result<Vec<LocalChangeEntity>>;

    /// Row id and resource of every pending change, oldest first
    async fn change_keys(&self) -> Result<Vec<(i64, ResourceKey)>>;

    /// One change by row id
    async fn get(&self, id: i64) -> Result<Option<LocalChangeEntity>>;

    /// Changes whose payload text contains `needle`, oldest first
    async fn containing(&self, needle: &str) -> Result<Vec<LocalChangeEntity>>;

    /// Replace the payload of one row
    async fn set_payload(&self, id: i64, payload: &str) -> Result<()>;

    /// Move every change of a resource to a new id
    async fn reassign(&self, resource_type: &str, old_id: &str, new_id: &str) -> Result<u64>;

    /// Delete exactly the rows named by `token`
    async fn delete_token(&self, token: &LocalChangeToken) -> Result<u64>;

    /// Delete every change for one resource
    async fn discard(&self, resource_type: &str, resource_id: &str) -> Result<u64>;

    /// Number of pending rows
    async fn count(&self) -> Result<i64>;
}

/// libSQL implementation of `LocalChangeRepository`
pub struct LibSqlLocalChangeRepository<'a> {
    conn: &'a Connection,
    differ: &'a dyn Differ,
}

impl<'a> LibSqlLocalChangeRepository<'a> {
    /// Create a new repository with the given connection and patch differ
    pub const fn new(conn: &'a Connection, differ: &'a dyn Differ) -> Self {
        Self { conn, differ }
    }

    fn parse_row(row: &libsql::Row) -> Result<LocalChangeEntity> {
        let change_type: String = row.get(4)?;
        Ok(LocalChangeEntity {
            id: row.get(0)?,
            resource_type: row.get(1)?,
            resource_id: row.get(2)?,
            timestamp: row.get(3)?,
            change_type: change_type.parse()?,
            payload: row.get(5)?,
            version_id: row.get(6)?,
        })
    }

    async fn last_change_type(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Option<LocalChangeType>> {
        let mut rows = self
            .conn
            .query(
                "SELECT change_type FROM local_changes
                 WHERE resource_type = ?1 AND resource_id = ?2
                 ORDER BY id DESC LIMIT 1",
                libsql::params![resource_type, resource_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?.parse()?)),
            None => Ok(None),
        }
    }

    /// Appends a row stamped with the version the stored resource has now.
    async fn append(
        &self,
        resource_type: &str,
        resource_id: &str,
        change_type: LocalChangeType,
        payload: &str,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO local_changes
                     (resource_type, resource_id, timestamp, change_type, payload, version_id)
                 VALUES (?1, ?2, ?3, ?4, ?5,
                     (SELECT version_id FROM resources WHERE resource_type = ?1 AND resource_id = ?2))",
                libsql::params![
                    resource_type,
                    resource_id,
                    timestamp_now(),
                    change_type.as_str(),
                    payload,
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_changes(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<LocalChangeEntity>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::parse_row(&row)?);
        }
        Ok(changes)
    }
}

impl LocalChangeRepository for LibSqlLocalChangeRepository<'_> {
    async fn add_insert(&self, resource: &Resource) -> Result<()> {
        let key = resource.key()?;
        if let Some(last @ (LocalChangeType::Insert | LocalChangeType::Update)) =
            self.last_change_type(&key.resource_type, &key.id).await?
        {
            return Err(Error::InvalidLocalChange(format!(
                "cannot insert {key}: last local change is {last}"
            )));
        }
        self.append(
            &key.resource_type,
            &key.id,
            LocalChangeType::Insert,
            &resource.to_json()?,
        )
        .await
    }

    async fn add_update(&self, old: &Resource, new: &Resource) -> Result<()> {
        let key = new.key()?;
        if self.last_change_type(&key.resource_type, &key.id).await?
            == Some(LocalChangeType::Delete)
        {
            return Err(Error::InvalidLocalChange(format!(
                "cannot update {key}: resource has been deleted locally"
            )));
        }

        let patch = self.differ.diff(old.as_value(), new.as_value())?;
        if patch.0.is_empty() {
            tracing::warn!("Update of {key} produced an empty diff; nothing recorded");
            return Ok(());
        }
        self.append(
            &key.resource_type,
            &key.id,
            LocalChangeType::Update,
            &patch_to_json(&patch)?,
        )
        .await
    }

    async fn add_delete(&self, resource_type: &str, resource_id: &str) -> Result<()> {
        if self.last_change_type(resource_type, resource_id).await?
            == Some(LocalChangeType::Delete)
        {
            return Err(Error::InvalidLocalChange(format!(
                "cannot delete {resource_type}/{resource_id}: already deleted locally"
            )));
        }
        self.append(resource_type, resource_id, LocalChangeType::Delete, "")
            .await
    }

    async fn local_changes(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<LocalChangeEntity>> {
        self.query_changes(
            "SELECT id, resource_type, resource_id, timestamp, change_type, payload, version_id
             FROM local_changes WHERE resource_type = ?1 AND resource_id = ?2
             ORDER BY id ASC",
            libsql::params![resource_type, resource_id],
        )
        .await
    }

    async fn all_local_changes(&self) -> Result<Vec<LocalChangeEntity>> {
        self.query_changes(
            "SELECT id, resource_type, resource_id, timestamp, change_type, payload, version_id
             FROM local_changes ORDER BY id ASC",
            (),
        )
        .await
    }

    async fn change_keys(&self) -> Result<Vec<(i64, ResourceKey)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, resource_type, resource_id FROM local_changes ORDER BY id ASC",
                (),
            )
            .await?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            let resource_type: String = row.get(1)?;
            let resource_id: String = row.get(2)?;
            keys.push((row.get(0)?, ResourceKey::new(resource_type, resource_id)));
        }
        Ok(keys)
    }

    async fn get(&self, id: i64) -> Result<Option<LocalChangeEntity>> {
        let mut changes = self
            .query_changes(
                "SELECT id, resource_type, resource_id, timestamp, change_type, payload, version_id
                 FROM local_changes WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        Ok(changes.pop())
    }

    async fn containing(&self, needle: &str) -> Result<Vec<LocalChangeEntity>> {
        self.query_changes(
            "SELECT id, resource_type, resource_id, timestamp, change_type, payload, version_id
             FROM local_changes WHERE instr(payload, ?1) > 0 ORDER BY id ASC",
            libsql::params![needle],
        )
        .await
    }

    async fn set_payload(&self, id: i64, payload: &str) -> Result<()> {
        self.conn
            .execute(
                "UPDATE local_changes SET payload = ?1 WHERE id = ?2",
                libsql::params![payload, id],
            )
            .await?;
        Ok(())
    }

    async fn reassign(&self, resource_type: &str, old_id: &str, new_id: &str) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "UPDATE local_changes SET resource_id = ?3
                 WHERE resource_type = ?1 AND resource_id = ?2",
                libsql::params![resource_type, old_id, new_id],
            )
            .await?;
        Ok(affected)
    }

    async fn delete_token(&self, token: &LocalChangeToken) -> Result<u64> {
        if token.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; token.ids().len()].join(", ");
        let sql = format!("DELETE FROM local_changes WHERE id IN ({placeholders})");
        let affected = self
            .conn
            .execute(&sql, libsql::params_from_iter(token.ids().iter().copied()))
            .await?;
        Ok(affected)
    }

    async fn discard(&self, resource_type: &str, resource_id: &str) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM local_changes WHERE resource_type = ?1 AND resource_id = ?2",
                libsql::params![resource_type, resource_id],
            )
            .await?;
        Ok(affected)
    }

    async fn count(&self) -> Result<i64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM local_changes", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}
