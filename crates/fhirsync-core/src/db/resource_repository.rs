//! Resource repository implementation

use crate::error::Result;
use crate::models::ResourceEntity;
use libsql::Connection;

/// Trait for current-state resource storage (async)
#[allow(async_fn_in_trait)]
pub trait ResourceRepository {
    /// Get a stored resource by type and id
    async fn get(&self, resource_type: &str, resource_id: &str) -> Result<Option<ResourceEntity>>;

    /// Insert or replace a resource row
    async fn upsert(&self, entity: &ResourceEntity) -> Result<()>;

    /// Delete a resource row, returning whether it existed
    async fn delete(&self, resource_type: &str, resource_id: &str) -> Result<bool>;

    /// Rows whose payload text contains `needle`
    async fn containing(&self, needle: &str) -> Result<Vec<ResourceEntity>>;

    /// Record server version metadata for a stored resource
    async fn update_version(
        &self,
        resource_type: &str,
        resource_id: &str,
        version_id: Option<&str>,
        last_updated: Option<&str>,
    ) -> Result<bool>;
}

/// libSQL implementation of `ResourceRepository`
pub struct LibSqlResourceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlResourceRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<ResourceEntity> {
        Ok(ResourceEntity {
            resource_type: row.get(0)?,
            resource_id: row.get(1)?,
            payload: row.get(2)?,
            version_id: row.get(3)?,
            last_updated: row.get(4)?,
        })
    }
}

impl ResourceRepository for LibSqlResourceRepository<'_> {
    async fn get(&self, resource_type: &str, resource_id: &str) -> Result<Option<ResourceEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT resource_type, resource_id, payload, version_id, last_updated
                 FROM resources WHERE resource_type = ?1 AND resource_id = ?2",
                libsql::params![resource_type, resource_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, entity: &ResourceEntity) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO resources
                 (resource_type, resource_id, payload, version_id, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    entity.resource_type.as_str(),
                    entity.resource_id.as_str(),
                    entity.payload.as_str(),
                    entity.version_id.clone(),
                    entity.last_updated.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, resource_type: &str, resource_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM resources WHERE resource_type = ?1 AND resource_id = ?2",
                libsql::params![resource_type, resource_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn containing(&self, needle: &str) -> Result<Vec<ResourceEntity>> {
        let mut rows = self
            .conn
            .query(
                "SELECT resource_type, resource_id, payload, version_id, last_updated
                 FROM resources WHERE instr(payload, ?1) > 0
                 ORDER BY resource_type, resource_id",
                libsql::params![needle],
            )
            .await?;

        let mut entities = Vec::new();
        while let Some(row) = rows.next().await? {
            entities.push(Self::parse_row(&row)?);
        }
        Ok(entities)
    }

    async fn update_version(
        &self,
        resource_type: &str,
        resource_id: &str,
        version_id: Option<&str>,
        last_updated: Option<&str>,
    ) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE resources
                 SET version_id = COALESCE(?3, version_id),
                     last_updated = COALESCE(?4, last_updated)
                 WHERE resource_type = ?1 AND resource_id = ?2",
                libsql::params![
                    resource_type,
                    resource_id,
                    version_id.map(ToString::to_string),
                    last_updated.map(ToString::to_string),
                ],
            )
            .await?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn entity(id: &str, payload: &str) -> ResourceEntity {
        ResourceEntity {
            resource_type: "Patient".into(),
            resource_id: id.into(),
            payload: payload.into(),
            version_id: None,
            last_updated: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get() {
        let db = setup().await;
        let repo = LibSqlResourceRepository::new(db.connection());

        repo.upsert(&entity("p-1", "{}")).await.unwrap();
        repo.upsert(&entity("p-1", r#"{"a":1}"#)).await.unwrap();

        let stored = repo.get("Patient", "p-1").await.unwrap().unwrap();
        assert_eq!(stored, entity("p-1", r#"{"a":1}"#));
        assert!(repo.get("Patient", "p-2").await.unwrap().is_none());
        assert!(repo.get("Observation", "p-1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_version_keeps_existing_when_none() {
        let db = setup().await;
        let repo = LibSqlResourceRepository::new(db.connection());
        repo.upsert(&entity("p-1", "{}")).await.unwrap();

        assert!(repo
            .update_version("Patient", "p-1", Some("2"), Some("2024-01-01T00:00:00Z"))
            .await
            .unwrap());
        assert!(repo.update_version("Patient", "p-1", None, None).await.unwrap());
        assert!(!repo.update_version("Patient", "p-9", Some("1"), None).await.unwrap());

        let stored = repo.get("Patient", "p-1").await.unwrap().unwrap();
        assert_eq!(stored.version_id.as_deref(), Some("2"));
        assert_eq!(stored.last_updated.as_deref(), Some("2024-01-01T00:00:00Z"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete() {
        let db = setup().await;
        let repo = LibSqlResourceRepository::new(db.connection());
        repo.upsert(&entity("a", "{}")).await.unwrap();

        assert!(repo.delete("Patient", "a").await.unwrap());
        assert!(!repo.delete("Patient", "a").await.unwrap());
        assert!(repo.get("Patient", "a").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_containing_matches_payload_text() {
        let db = setup().await;
        let repo = LibSqlResourceRepository::new(db.connection());
        repo.upsert(&entity("a", r#"{"link":{"reference":"Patient/b"}}"#))
            .await
            .unwrap();
        repo.upsert(&entity("c", "{}")).await.unwrap();

        let found = repo.containing("Patient/b").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].resource_id, "a");
    }
}
