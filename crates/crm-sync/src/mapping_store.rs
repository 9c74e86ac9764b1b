//! Identity Mapper: durable (integration, CRM object, CRM id) -> host record table
//!
//! Every mutation is a single conditional operation on the store, so two
//! sync runs racing on the same key cannot both create a row for it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crm_sync_api::{IdentityMapping, MappingKey, Reclassification, RemoteObject, Result};

/// Outcome of [`MappingStore::upsert_mapping`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No row existed for the key; the given mapping was stored
    Inserted(IdentityMapping),
    /// A row already existed; its local identity was kept and `last_sync`
    /// advanced. The returned mapping is the stored row.
    Updated(IdentityMapping),
}

impl UpsertOutcome {
    pub fn mapping(&self) -> &IdentityMapping {
        match self {
            UpsertOutcome::Inserted(m) | UpsertOutcome::Updated(m) => m,
        }
    }

    pub fn into_mapping(self) -> IdentityMapping {
        match self {
            UpsertOutcome::Inserted(m) | UpsertOutcome::Updated(m) => m,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted(_))
    }
}

/// Outcome of [`MappingStore::rewrite_mapping`]
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    Rewritten(IdentityMapping),
    /// The previous row no longer matches (another run got there first)
    Stale,
}

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn find_mapping(&self, key: &MappingKey) -> Result<Option<IdentityMapping>>;

    /// Find the mapping that points a host record at a given CRM object type
    async fn find_by_local(
        &self,
        integration: &str,
        remote_object: RemoteObject,
        local_object: &str,
        local_id: &str,
    ) -> Result<Option<IdentityMapping>>;

    /// Insert the mapping if its key is free, otherwise advance the stored
    /// row's `last_sync`. Never produces a second row for one key.
    async fn upsert_mapping(&self, mapping: IdentityMapping) -> Result<UpsertOutcome>;

    /// Move the row at `previous` to `current`, keeping the local identity.
    ///
    /// Compare-and-swap: applied only if `previous` still maps to the same
    /// local record and `current` is free.
    async fn rewrite_mapping(&self, reclassification: &Reclassification) -> Result<RewriteOutcome>;

    /// Record CRM identities that no longer exist on the remote side
    async fn mark_deleted(&self, keys: &[MappingKey]) -> Result<()>;

    async fn is_deleted(&self, key: &MappingKey) -> Result<bool>;
}

#[derive(Debug, Default)]
struct MappingTable {
    rows: HashMap<MappingKey, IdentityMapping>,
    deleted: HashMap<MappingKey, DateTime<Utc>>,
}

/// In-process mapping store
///
/// Suitable for tests and for hosts that persist the table themselves
/// between runs (see [`MemoryMappingStore::snapshot`]).
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    table: RwLock<MappingTable>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with previously persisted mappings
    pub fn with_mappings(mappings: impl IntoIterator<Item = IdentityMapping>) -> Self {
        let rows = mappings.into_iter().map(|m| (m.key(), m)).collect();
        Self {
            table: RwLock::new(MappingTable {
                rows,
                deleted: HashMap::new(),
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// All active mappings, ordered by key for stable output
    pub async fn snapshot(&self) -> Vec<IdentityMapping> {
        let table = self.table.read().await;
        let mut rows: Vec<_> = table.rows.values().cloned().collect();
        rows.sort_by(|a, b| {
            (&a.integration, a.remote_object, &a.remote_id)
                .cmp(&(&b.integration, b.remote_object, &b.remote_id))
        });
        rows
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn find_mapping(&self, key: &MappingKey) -> Result<Option<IdentityMapping>> {
        Ok(self.table.read().await.rows.get(key).cloned())
    }

    async fn find_by_local(
        &self,
        integration: &str,
        remote_object: RemoteObject,
        local_object: &str,
        local_id: &str,
    ) -> Result<Option<IdentityMapping>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|m| {
                m.integration == integration
                    && m.remote_object == remote_object
                    && m.local_object == local_object
                    && m.local_id == local_id
            })
            .cloned())
    }

    async fn upsert_mapping(&self, mapping: IdentityMapping) -> Result<UpsertOutcome> {
        let key = mapping.key();
        let mut table = self.table.write().await;
        table.deleted.remove(&key);

        if let Some(existing) = table.rows.get_mut(&key) {
            if mapping.last_sync > existing.last_sync {
                existing.last_sync = mapping.last_sync;
            }
            debug!(
                integration = %key.integration,
                object = %key.remote_object,
                remote_id = %key.remote_id,
                local_id = %existing.local_id,
                "[MemoryMappingStore] mapping updated"
            );
            return Ok(UpsertOutcome::Updated(existing.clone()));
        }

        info!(
            integration = %key.integration,
            object = %key.remote_object,
            remote_id = %key.remote_id,
            local_id = %mapping.local_id,
            "[MemoryMappingStore] mapping created"
        );
        table.rows.insert(key, mapping.clone());
        Ok(UpsertOutcome::Inserted(mapping))
    }

    async fn rewrite_mapping(&self, reclassification: &Reclassification) -> Result<RewriteOutcome> {
        let mut table = self.table.write().await;

        let matches_previous = table.rows.get(&reclassification.previous).is_some_and(|m| {
            m.local_object == reclassification.local_object
                && m.local_id == reclassification.local_id
        });
        if !matches_previous || table.rows.contains_key(&reclassification.current) {
            return Ok(RewriteOutcome::Stale);
        }

        table.rows.remove(&reclassification.previous);
        let current = &reclassification.current;
        let rewritten = IdentityMapping {
            integration: current.integration.clone(),
            remote_object: current.remote_object,
            remote_id: current.remote_id.clone(),
            local_object: reclassification.local_object.clone(),
            local_id: reclassification.local_id.clone(),
            last_sync: reclassification.modified_time,
        };
        table.deleted.remove(current);
        table.rows.insert(current.clone(), rewritten.clone());
        Ok(RewriteOutcome::Rewritten(rewritten))
    }

    async fn mark_deleted(&self, keys: &[MappingKey]) -> Result<()> {
        let now = Utc::now();
        let mut table = self.table.write().await;
        for key in keys {
            table.rows.remove(key);
            table.deleted.insert(key.clone(), now);
        }
        Ok(())
    }

    async fn is_deleted(&self, key: &MappingKey) -> Result<bool> {
        Ok(self.table.read().await.deleted.contains_key(key))
    }
}
