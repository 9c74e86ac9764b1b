//! Outbound interface exposed to the host for one CRM object type

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_sync_api::{
    IdentityMapping, OrderChange, Reclassification, RemoteObject, Result, SyncReport,
    UpdatedObjectMapping,
};

/// Request for changes to one CRM object type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSyncRequest {
    pub object: RemoteObject,
    /// Watermark: only records modified strictly after this are returned
    pub since: DateTime<Utc>,
    pub fields: Vec<String>,
}

#[async_trait]
pub trait ObjectSyncDataExchange: Send + Sync {
    fn object(&self) -> RemoteObject;

    /// Read records changed after the watermark and report them normalized,
    /// without touching the identity mappings.
    ///
    /// The returned `reclassified` entries are pending: they only take effect
    /// once passed to [`commit_reclassifications`](Self::commit_reclassifications).
    async fn stage_object_sync_report(&self, request: &ObjectSyncRequest) -> Result<SyncReport>;

    /// Apply staged reclassifications; returns the ones that were applied
    async fn commit_reclassifications(
        &self,
        pending: Vec<Reclassification>,
    ) -> Result<Vec<Reclassification>>;

    /// Stage and commit in one go.
    ///
    /// Fails without touching the identity mappings if the run fails.
    async fn get_object_sync_report(&self, request: &ObjectSyncRequest) -> Result<SyncReport> {
        let mut report = self.stage_object_sync_report(request).await?;
        let pending = std::mem::take(&mut report.reclassified);
        report.reclassified = self.commit_reclassifications(pending).await?;
        Ok(report)
    }

    /// Create the records in the CRM. Fills in `remote_id` on each change
    /// that was created and returns the new mappings.
    async fn insert(&self, changes: &mut [OrderChange]) -> Result<Vec<IdentityMapping>>;

    async fn update(&self, ids: &[String], changes: &[OrderChange]) -> Result<Vec<UpdatedObjectMapping>>;

    /// Deleting CRM records is not offered; implementations report
    /// `SyncError::Unsupported` instead of doing nothing.
    async fn delete(&self, changes: &[OrderChange]) -> Result<()>;
}
