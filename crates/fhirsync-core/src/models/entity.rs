//! Stored rows that are not part of the change log

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{Resource, ResourceKey};

/// Current state of one resource as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntity {
    pub resource_type: String,
    pub resource_id: String,
    /// Compact JSON of the resource
    pub payload: String,
    /// Server version this state is based on, if it came from or reached the server
    pub version_id: Option<String>,
    pub last_updated: Option<String>,
}

impl ResourceEntity {
    /// Build the row for a resource, taking version and lastUpdated from `meta`.
    pub fn from_resource(resource: &Resource) -> Result<Self> {
        let key = resource.key()?;
        Ok(Self {
            resource_type: key.resource_type,
            resource_id: key.id,
            payload: resource.to_json()?,
            version_id: resource.version_id().map(ToString::to_string),
            last_updated: resource.last_updated().map(ToString::to_string),
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.resource_id)
    }

    pub fn resource(&self) -> Result<Resource> {
        Resource::from_json(&self.payload)
    }
}
