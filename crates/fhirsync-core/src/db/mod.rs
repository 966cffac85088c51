//! Database layer for fhirsync

mod connection;
mod local_change_repository;
mod migrations;
mod resource_repository;
mod sync_state_repository;

pub use connection::Database;
pub use local_change_repository::{LibSqlLocalChangeRepository, LocalChangeRepository};
pub use resource_repository::{LibSqlResourceRepository, ResourceRepository};
pub use sync_state_repository::{
    LAST_SYNC_TIMESTAMP, LibSqlSyncStateRepository, SyncStateRepository,
};
