//! Reclassification Resolver
//!
//! A Lead converted to a Contact in the CRM shows up as a new Contact record.
//! If the host already tracks the person through the old Lead mapping, that
//! mapping is rewritten to point at the Contact instead of the host seeing a
//! delete followed by a create.
//!
//! Resolution is split in two: [`ReclassificationResolver::resolve`] only
//! reads, [`ReclassificationResolver::commit`] applies the rewrites. Callers
//! resolve a whole batch first and commit only once the batch is known to
//! succeed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crm_sync_api::{
    FieldType, IdentityMapping, MappingKey, Reclassification, RemoteObject, Result, SyncError,
    Value, LOCAL_CONTACT_OBJECT,
};

use crate::local_directory::LocalContactFinder;
use crate::mapping_store::{MappingStore, RewriteOutcome};
use crate::normalizer::ValueNormalizer;

/// The parts of a Contact record the resolver looks at
#[derive(Debug, Clone)]
pub struct ReclassificationCandidate {
    pub remote_id: String,
    pub modified_time: DateTime<Utc>,
    pub converted_from_lead: bool,
    pub email: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Not converted, or already mapped as a Contact: regular update flow
    Normal,
    /// Converted and the host tracks it as a Lead: rewrite the mapping and
    /// keep the record out of the update batch
    Remapped(Reclassification),
    /// Converted but nothing to remap; handled like an unmapped record
    Skipped,
}

pub struct ReclassificationResolver {
    integration: String,
    mappings: Arc<dyn MappingStore>,
    contacts: Arc<dyn LocalContactFinder>,
    normalizer: ValueNormalizer,
}

impl ReclassificationResolver {
    pub fn new(
        integration: impl Into<String>,
        mappings: Arc<dyn MappingStore>,
        contacts: Arc<dyn LocalContactFinder>,
    ) -> Self {
        Self {
            integration: integration.into(),
            mappings,
            contacts,
            normalizer: ValueNormalizer::new(),
        }
    }

    pub async fn resolve(&self, candidate: &ReclassificationCandidate) -> Result<Resolution> {
        if !candidate.converted_from_lead {
            return Ok(Resolution::Normal);
        }

        let current = MappingKey::new(
            &self.integration,
            RemoteObject::Contacts,
            &candidate.remote_id,
        );
        if self.mappings.find_mapping(&current).await?.is_some() {
            debug!(
                integration = %self.integration,
                object = %RemoteObject::Contacts,
                remote_id = %candidate.remote_id,
                "Converted contact already mapped"
            );
            return Ok(Resolution::Normal);
        }

        let email = match self
            .normalizer
            .normalize_for_local(FieldType::Email, &candidate.email)
        {
            Ok(normalized) => match normalized.normalized {
                Value::String(email) => email,
                _ => return Ok(self.skipped(candidate, "no email")),
            },
            Err(e) => {
                warn!(
                    integration = %self.integration,
                    object = %RemoteObject::Contacts,
                    remote_id = %candidate.remote_id,
                    error = %e,
                    "Converted contact has an unusable email"
                );
                return Ok(self.skipped(candidate, "invalid email"));
            }
        };

        let Some(local_id) = self.contacts.find_by_email(&email).await? else {
            return Ok(self.skipped(candidate, "no local contact"));
        };

        let previous = match self.lead_mapping(&local_id).await {
            Ok(mapping) => mapping,
            Err(SyncError::MappingNotFound { .. }) => {
                return Ok(self.skipped(candidate, "no lead mapping"));
            }
            Err(e) => return Err(e),
        };

        info!(
            integration = %self.integration,
            object = %RemoteObject::Contacts,
            remote_id = %candidate.remote_id,
            previous_remote_id = %previous.remote_id,
            local_id = %previous.local_id,
            outcome = "remap",
            "Lead converted to contact"
        );

        Ok(Resolution::Remapped(Reclassification {
            previous: previous.key(),
            current,
            local_object: previous.local_object,
            local_id: previous.local_id,
            modified_time: candidate.modified_time,
        }))
    }

    /// The Lead mapping through which the host tracks a local contact
    pub async fn lead_mapping(&self, local_id: &str) -> Result<IdentityMapping> {
        self.mappings
            .find_by_local(
                &self.integration,
                RemoteObject::Leads,
                LOCAL_CONTACT_OBJECT,
                local_id,
            )
            .await?
            .ok_or_else(|| SyncError::MappingNotFound {
                object: LOCAL_CONTACT_OBJECT.to_string(),
                id: local_id.to_string(),
            })
    }

    /// Rewrite the mappings and mark the old Lead identities deleted.
    ///
    /// Returns the reclassifications that were applied; one whose mapping was
    /// already moved by a concurrent run is dropped.
    pub async fn commit(
        &self,
        reclassifications: Vec<Reclassification>,
    ) -> Result<Vec<Reclassification>> {
        let mut applied = Vec::with_capacity(reclassifications.len());
        for reclassification in reclassifications {
            match self.mappings.rewrite_mapping(&reclassification).await? {
                RewriteOutcome::Rewritten(_) => applied.push(reclassification),
                RewriteOutcome::Stale => warn!(
                    integration = %self.integration,
                    object = %reclassification.previous.remote_object,
                    remote_id = %reclassification.previous.remote_id,
                    outcome = "stale",
                    "Mapping changed before remap could be applied"
                ),
            }
        }

        let deleted: Vec<MappingKey> = applied.iter().map(|r| r.previous.clone()).collect();
        self.mappings.mark_deleted(&deleted).await?;
        for key in &deleted {
            info!(
                integration = %key.integration,
                object = %key.remote_object,
                remote_id = %key.remote_id,
                outcome = "deleted",
                "Marked lead as deleted"
            );
        }

        Ok(applied)
    }

    fn skipped(&self, candidate: &ReclassificationCandidate, reason: &str) -> Resolution {
        debug!(
            integration = %self.integration,
            object = %RemoteObject::Contacts,
            remote_id = %candidate.remote_id,
            reason,
            outcome = "skipped",
            "Converted contact not remapped"
        );
        Resolution::Skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_directory::MemoryContactDirectory;
    use crate::mapping_store::MemoryMappingStore;
    use serde_json::json;

    const INTEGRATION: &str = "VtigerCrm";

    fn lead_mapping(remote_id: &str, local_id: &str) -> IdentityMapping {
        IdentityMapping {
            integration: INTEGRATION.to_string(),
            remote_object: RemoteObject::Leads,
            remote_id: remote_id.to_string(),
            local_object: LOCAL_CONTACT_OBJECT.to_string(),
            local_id: local_id.to_string(),
            last_sync: Utc::now(),
        }
    }

    fn candidate(converted: bool, email: &str) -> ReclassificationCandidate {
        ReclassificationCandidate {
            remote_id: "12x5".to_string(),
            modified_time: Utc::now(),
            converted_from_lead: converted,
            email: json!(email),
        }
    }

    async fn resolver(
        mappings: Vec<IdentityMapping>,
        contacts: &[(&str, &str)],
    ) -> (ReclassificationResolver, Arc<MemoryMappingStore>) {
        let store = Arc::new(MemoryMappingStore::with_mappings(mappings));
        let directory = Arc::new(MemoryContactDirectory::new());
        for (email, id) in contacts {
            directory.insert(email, *id).await;
        }
        (
            ReclassificationResolver::new(INTEGRATION, store.clone(), directory),
            store,
        )
    }

    #[tokio::test]
    async fn test_not_converted_is_normal() {
        let (resolver, _) = resolver(vec![], &[]).await;
        assert_eq!(
            resolver.resolve(&candidate(false, "a@x.com")).await.unwrap(),
            Resolution::Normal
        );
    }

    #[tokio::test]
    async fn test_converted_with_lead_mapping_is_remapped() {
        let (resolver, store) = resolver(vec![lead_mapping("2x9", "42")], &[("a@x.com", "42")]).await;

        let resolution = resolver.resolve(&candidate(true, "a@x.com")).await.unwrap();
        let Resolution::Remapped(reclassification) = resolution else {
            panic!("expected remap, got {:?}", resolution);
        };
        assert_eq!(reclassification.previous.remote_id, "2x9");
        assert_eq!(reclassification.current.remote_object, RemoteObject::Contacts);
        assert_eq!(reclassification.local_id, "42");

        // resolve never mutates
        assert_eq!(store.snapshot().await[0].remote_object, RemoteObject::Leads);

        let applied = resolver.commit(vec![reclassification.clone()]).await.unwrap();
        assert_eq!(applied.len(), 1);
        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].remote_object, RemoteObject::Contacts);
        assert_eq!(rows[0].remote_id, "12x5");
        assert_eq!(rows[0].local_id, "42");
        assert!(store.is_deleted(&reclassification.previous).await.unwrap());
    }

    #[tokio::test]
    async fn test_lead_mapping_lookup_reports_missing_mapping() {
        let (resolver, _) = resolver(vec![lead_mapping("2x9", "42")], &[]).await;
        assert_eq!(resolver.lead_mapping("42").await.unwrap().remote_id, "2x9");
        assert!(matches!(
            resolver.lead_mapping("43").await,
            Err(SyncError::MappingNotFound { ref id, .. }) if id == "43"
        ));
    }

    #[tokio::test]
    async fn test_converted_without_lead_mapping_is_skipped() {
        let (resolver, store) = resolver(vec![], &[("a@x.com", "42")]).await;
        assert_eq!(
            resolver.resolve(&candidate(true, "a@x.com")).await.unwrap(),
            Resolution::Skipped
        );
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_converted_without_local_contact_is_skipped() {
        let (resolver, store) = resolver(vec![lead_mapping("2x9", "42")], &[]).await;
        assert_eq!(
            resolver.resolve(&candidate(true, "a@x.com")).await.unwrap(),
            Resolution::Skipped
        );
        assert_eq!(store.snapshot().await[0].remote_object, RemoteObject::Leads);
    }

    #[tokio::test]
    async fn test_converted_with_bad_email_is_skipped() {
        let (resolver, _) = resolver(vec![lead_mapping("2x9", "42")], &[("a@x.com", "42")]).await;
        assert_eq!(
            resolver.resolve(&candidate(true, "not an email")).await.unwrap(),
            Resolution::Skipped
        );
    }

    #[tokio::test]
    async fn test_commit_drops_stale_reclassification() {
        let (resolver, store) = resolver(vec![lead_mapping("2x9", "42")], &[("a@x.com", "42")]).await;
        let Resolution::Remapped(reclassification) =
            resolver.resolve(&candidate(true, "a@x.com")).await.unwrap()
        else {
            panic!("expected remap");
        };

        let first = resolver.commit(vec![reclassification.clone()]).await.unwrap();
        let second = resolver.commit(vec![reclassification]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
        assert_eq!(store.len().await, 1);
    }
}
