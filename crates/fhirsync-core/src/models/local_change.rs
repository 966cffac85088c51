//! Local change log models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::ResourceKey;

/// Kind of mutation recorded in the local change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LocalChangeType {
    /// Payload is the full resource
    Insert,
    /// Payload is an RFC 6902 JSON patch against the previous state
    Update,
    /// Payload is empty
    Delete,
}

impl LocalChangeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for LocalChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalChangeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::Database(format!("unknown local change type: {other}"))),
        }
    }
}

/// One row of the local change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChangeEntity {
    /// Monotonic row id, assigned at insert
    pub id: i64,
    pub resource_type: String,
    pub resource_id: String,
    /// RFC 3339 time the change was recorded
    pub timestamp: String,
    pub change_type: LocalChangeType,
    pub payload: String,
    /// Server version of the resource when the change was recorded
    pub version_id: Option<String>,
}

impl LocalChangeEntity {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.resource_id)
    }
}

/// Ids of the log rows a squashed change subsumes.
///
/// After a confirmed upload exactly these rows are deleted, never more or
/// fewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalChangeToken(pub Vec<i64>);

impl LocalChangeToken {
    pub const fn new(ids: Vec<i64>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[i64] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Net change for one resource, ready to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChange {
    pub resource_type: String,
    pub resource_id: String,
    /// Timestamp of the newest change folded into this one
    pub timestamp: String,
    pub change_type: LocalChangeType,
    pub payload: String,
    /// Server version the first folded change was made against
    pub version_id: Option<String>,
    pub token: LocalChangeToken,
}

impl LocalChange {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.resource_id)
    }
}

impl From<LocalChangeEntity> for LocalChange {
    fn from(entity: LocalChangeEntity) -> Self {
        Self {
            resource_type: entity.resource_type,
            resource_id: entity.resource_id,
            timestamp: entity.timestamp,
            change_type: entity.change_type,
            payload: entity.payload,
            version_id: entity.version_id,
            token: LocalChangeToken(vec![entity.id]),
        }
    }
}

/// A `(token, change)` pair: the net effect of one or more log rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquashedLocalChange {
    pub token: LocalChangeToken,
    pub local_change: LocalChange,
}

impl SquashedLocalChange {
    pub fn key(&self) -> ResourceKey {
        self.local_change.key()
    }

    pub fn resource_type(&self) -> &str {
        &self.local_change.resource_type
    }

    pub const fn change_type(&self) -> LocalChangeType {
        self.local_change.change_type
    }
}

impl From<LocalChangeEntity> for SquashedLocalChange {
    fn from(entity: LocalChangeEntity) -> Self {
        let local_change = LocalChange::from(entity);
        Self {
            token: local_change.token.clone(),
            local_change,
        }
    }
}
