//! Identity correspondence between host records and CRM records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::RemoteObject;

/// Identity of a mapping row: at most one active mapping exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    pub integration: String,
    pub remote_object: RemoteObject,
    pub remote_id: String,
}

impl MappingKey {
    pub fn new(
        integration: impl Into<String>,
        remote_object: RemoteObject,
        remote_id: impl Into<String>,
    ) -> Self {
        Self {
            integration: integration.into(),
            remote_object,
            remote_id: remote_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMapping {
    pub integration: String,
    pub remote_object: RemoteObject,
    pub remote_id: String,
    pub local_object: String,
    pub local_id: String,
    pub last_sync: DateTime<Utc>,
}

impl IdentityMapping {
    pub fn key(&self) -> MappingKey {
        MappingKey::new(&self.integration, self.remote_object, &self.remote_id)
    }
}

/// Result of a successful remote update, handed back to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedObjectMapping {
    pub remote_object: RemoteObject,
    pub remote_id: String,
    pub local_object: String,
    pub local_id: String,
    pub modified_time: DateTime<Utc>,
}

/// A CRM record whose type changed externally (Lead converted to Contact).
///
/// The mapping at `previous` is rewritten in place to `current`; the local
/// identity stays the same so host references keyed on it survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reclassification {
    pub previous: MappingKey,
    pub current: MappingKey,
    pub local_object: String,
    pub local_id: String,
    pub modified_time: DateTime<Utc>,
}
