//! Contacts exchange
//!
//! Besides the regular flow, a Contact flagged as converted from a Lead is
//! run through the reclassification resolver first; a remapped Contact is
//! reported as a reclassification and never as a field change.

use async_trait::async_trait;
use tracing::info;

use crm_sync::exchange::{ObjectSyncDataExchange, ObjectSyncRequest};
use crm_sync::reclassify::{ReclassificationCandidate, ReclassificationResolver, Resolution};
use crm_sync::report_builder::SyncReportBuilder;
use crm_sync_api::{
    IdentityMapping, OrderChange, Reclassification, RemoteObject, Result, SyncReport,
    UpdatedObjectMapping,
};

use crate::general_exchange::GeneralDataExchange;
use crate::models::{BaseModel, VtigerRecord, FIELD_EMAIL};

/// Fields every contact report carries on top of the requested ones
pub const CONTACT_EXTRA_FIELDS: [&str; 7] = [
    "isconvertedfromlead",
    "leadsource",
    "reference",
    "source",
    "contact_id",
    "emailoptout",
    "donotcall",
];

pub struct ContactDataExchange {
    general: GeneralDataExchange,
    resolver: ReclassificationResolver,
}

impl ContactDataExchange {
    pub fn new(general: GeneralDataExchange, resolver: ReclassificationResolver) -> Self {
        Self { general, resolver }
    }

    fn report_fields(requested: &[String]) -> Vec<String> {
        let mut fields = requested.to_vec();
        for extra in CONTACT_EXTRA_FIELDS {
            if !fields.iter().any(|f| f == extra) {
                fields.push(extra.to_string());
            }
        }
        fields
    }

    /// The resolver matches converted contacts by email, so it is always
    /// queried even when not reported
    fn query_fields(report_fields: &[String]) -> Vec<String> {
        let mut fields = report_fields.to_vec();
        if !fields.iter().any(|f| f == FIELD_EMAIL) {
            fields.push(FIELD_EMAIL.to_string());
        }
        fields
    }

    fn candidate(record: &VtigerRecord) -> Result<Option<ReclassificationCandidate>> {
        let Some(contact) = record.as_contact() else {
            return Ok(None);
        };
        let Some(remote_id) = contact.id() else {
            return Ok(None);
        };
        Ok(Some(ReclassificationCandidate {
            remote_id: remote_id.to_string(),
            modified_time: contact.modified_time()?,
            converted_from_lead: contact.is_converted_from_lead(),
            email: contact.email(),
        }))
    }
}

#[async_trait]
impl ObjectSyncDataExchange for ContactDataExchange {
    fn object(&self) -> RemoteObject {
        RemoteObject::Contacts
    }

    #[tracing::instrument(name = "exchange.contacts.report", skip_all, fields(since = %request.since))]
    async fn stage_object_sync_report(&self, request: &ObjectSyncRequest) -> Result<SyncReport> {
        let fields = Self::report_fields(&request.fields);
        let records = self
            .general
            .read(request.since, &Self::query_fields(&fields))
            .await?;
        let module = self.general.module_info().await?;

        let mut builder = SyncReportBuilder::new();
        for record in &records {
            let resolution = match Self::candidate(record) {
                Ok(Some(candidate)) => self.resolver.resolve(&candidate).await?,
                Ok(None) => Resolution::Normal,
                Err(e) if e.is_record_level() => Resolution::Normal,
                Err(e) => return Err(e),
            };

            match resolution {
                Resolution::Remapped(reclassification) => {
                    builder.add_reclassification(reclassification);
                }
                Resolution::Normal | Resolution::Skipped => {
                    let id = record.model().id().unwrap_or_default();
                    if builder.contains(RemoteObject::Contacts, id) {
                        continue;
                    }
                    self.general
                        .append_to_report(&mut builder, module, record, &fields)?;
                }
            }
        }

        let report = builder.build();
        info!(
            integration = %self.general.integration(),
            object = %RemoteObject::Contacts,
            changes = report.objects.len(),
            pending_reclassified = report.reclassified.len(),
            "Built contact sync report"
        );
        Ok(report)
    }

    async fn commit_reclassifications(
        &self,
        pending: Vec<Reclassification>,
    ) -> Result<Vec<Reclassification>> {
        self.resolver.commit(pending).await
    }

    #[tracing::instrument(name = "exchange.contacts.insert", skip_all, fields(count = changes.len()))]
    async fn insert(&self, changes: &mut [OrderChange]) -> Result<Vec<IdentityMapping>> {
        if !self.general.settings().should_push_contacts_as_contacts() {
            info!(
                integration = %self.general.integration(),
                object = %RemoteObject::Contacts,
                count = changes.len(),
                outcome = "skipped",
                "Pushing contacts as contacts is disabled"
            );
            return Ok(Vec::new());
        }
        self.general.insert_internal(changes).await
    }

    #[tracing::instrument(name = "exchange.contacts.update", skip_all, fields(count = changes.len()))]
    async fn update(&self, ids: &[String], changes: &[OrderChange]) -> Result<Vec<UpdatedObjectMapping>> {
        self.general.update_internal(ids, changes).await
    }

    async fn delete(&self, _changes: &[OrderChange]) -> Result<()> {
        Err(self.general.unsupported_delete())
    }
}
