//! Sync Report Builder

use std::collections::HashSet;
use tracing::warn;

use crm_sync_api::{
    FieldType, NormalizedField, ObjectChange, Reclassification, RemoteObject, Result, SyncReport,
    DNC_EMAIL_FIELD, DNC_SMS_FIELD,
};

use crate::normalizer::ValueNormalizer;

/// Accumulates object changes and reclassifications in read order.
///
/// A remote identity appears at most once per report, either as an object
/// change or as a reclassification. Entries are never modified once added.
#[derive(Debug, Default)]
pub struct SyncReportBuilder {
    objects: Vec<ObjectChange>,
    reclassified: Vec<Reclassification>,
    seen: HashSet<(RemoteObject, String)>,
}

impl SyncReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, object: RemoteObject, remote_id: &str) -> bool {
        self.seen.contains(&(object, remote_id.to_string()))
    }

    /// Add a change; returns false (and leaves the report untouched) if the
    /// identity is already present
    pub fn add_object(&mut self, change: ObjectChange) -> bool {
        if !self.seen.insert((change.object, change.remote_id.clone())) {
            warn!(
                object = %change.object,
                remote_id = %change.remote_id,
                outcome = "duplicate",
                "Record already in report, keeping first occurrence"
            );
            return false;
        }
        self.objects.push(change);
        true
    }

    pub fn add_reclassification(&mut self, reclassification: Reclassification) -> bool {
        let current = &reclassification.current;
        if !self
            .seen
            .insert((current.remote_object, current.remote_id.clone()))
        {
            return false;
        }
        self.reclassified.push(reclassification);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.reclassified.is_empty()
    }

    pub fn build(self) -> SyncReport {
        SyncReport {
            objects: self.objects,
            reclassified: self.reclassified,
        }
    }
}

/// Attach the two synthesized do-not-contact fields, both mirroring the
/// record's opt-out flag
pub fn attach_do_not_contact(
    change: &mut ObjectChange,
    normalizer: &ValueNormalizer,
    opt_out: &serde_json::Value,
) -> Result<()> {
    let value = normalizer.normalize_for_local(FieldType::DoNotContact, opt_out)?;
    change.add_field(NormalizedField::new(DNC_EMAIL_FIELD, value.clone()));
    change.add_field(NormalizedField::new(DNC_SMS_FIELD, value));
    Ok(())
}
