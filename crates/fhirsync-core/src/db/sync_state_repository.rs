//! Sync bookkeeping: per-type download watermarks and key/value state

use chrono::DateTime;
use libsql::Connection;

use crate::error::Result;

/// Key under which the completion time of the last successful sync is kept
pub const LAST_SYNC_TIMESTAMP: &str = "last_sync_timestamp";

/// Trait for sync state storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncStateRepository {
    /// Read a state value
    async fn get_value(&self, key: &str) -> Result<Option<String>>;

    /// Write a state value
    async fn set_value(&self, key: &str, value: &str) -> Result<()>;

    /// Newest downloaded `meta.lastUpdated` for a resource type
    async fn last_updated(&self, resource_type: &str) -> Result<Option<String>>;

    /// Raise the watermark for a resource type; older timestamps are ignored
    async fn record_last_updated(&self, resource_type: &str, last_updated: &str) -> Result<()>;
}

/// libSQL implementation of `SyncStateRepository`
pub struct LibSqlSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

/// True when `candidate` is strictly newer than `current`.
///
/// Instants are compared when both parse as RFC 3339; otherwise the text is.
fn is_newer(candidate: &str, current: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(candidate),
        DateTime::parse_from_rfc3339(current),
    ) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => candidate > current,
    }
}

impl SyncStateRepository for LibSqlSyncStateRepository<'_> {
    async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM sync_state WHERE key = ?", [key])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn last_updated(&self, resource_type: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_updated FROM synced_resources WHERE resource_type = ?",
                [resource_type],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn record_last_updated(&self, resource_type: &str, last_updated: &str) -> Result<()> {
        if let Some(current) = self.last_updated(resource_type).await? {
            if !is_newer(last_updated, &current) {
                return Ok(());
            }
        }
        self.conn
            .execute(
                "INSERT OR REPLACE INTO synced_resources (resource_type, last_updated) VALUES (?, ?)",
                [resource_type, last_updated],
            )
            .await?;
        Ok(())
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

    #[tokio::test(flavor = "multi_thread")]
    async fn test_value_roundtrip() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        assert_eq!(repo.get_value(LAST_SYNC_TIMESTAMP).await.unwrap(), None);
        repo.set_value(LAST_SYNC_TIMESTAMP, "2024-01-01T00:00:00.000Z")
            .await
            .unwrap();
        repo.set_value(LAST_SYNC_TIMESTAMP, "2024-02-01T00:00:00.000Z")
            .await
            .unwrap();
        assert_eq!(
            repo.get_value(LAST_SYNC_TIMESTAMP).await.unwrap().as_deref(),
            Some("2024-02-01T00:00:00.000Z")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watermark_only_moves_forward() {
        let db = setup().await;
        let repo = LibSqlSyncStateRepository::new(db.connection());

        repo.record_last_updated("Patient", "2024-03-01T10:00:00+02:00")
            .await
            .unwrap();
        // later instant even though it sorts earlier as text
        repo.record_last_updated("Patient", "2024-03-01T09:00:00Z")
            .await
            .unwrap();
        assert_eq!(
            repo.last_updated("Patient").await.unwrap().as_deref(),
            Some("2024-03-01T09:00:00Z")
        );

        repo.record_last_updated("Patient", "2024-02-01T00:00:00Z")
            .await
            .unwrap();
        repo.record_last_updated("Observation", "2024-01-01T00:00:00Z")
            .await
            .unwrap();

        assert_eq!(
            repo.last_updated("Patient").await.unwrap().as_deref(),
            Some("2024-03-01T09:00:00Z")
        );
        assert_eq!(
            repo.last_updated("Observation").await.unwrap().as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }
}
