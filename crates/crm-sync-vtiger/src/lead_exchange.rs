use async_trait::async_trait;
use tracing::info;

use crm_sync::exchange::{ObjectSyncDataExchange, ObjectSyncRequest};
use crm_sync::report_builder::SyncReportBuilder;
use crm_sync_api::{
    IdentityMapping, OrderChange, Reclassification, RemoteObject, Result, SyncError, SyncReport,
    UpdatedObjectMapping,
};

use crate::general_exchange::GeneralDataExchange;
use crate::models::FIELD_EMAIL_OPTOUT;

pub struct LeadDataExchange {
    general: GeneralDataExchange,
}

impl LeadDataExchange {
    pub fn new(general: GeneralDataExchange) -> Self {
        Self { general }
    }
}

#[async_trait]
impl ObjectSyncDataExchange for LeadDataExchange {
    fn object(&self) -> RemoteObject {
        RemoteObject::Leads
    }

    #[tracing::instrument(name = "exchange.leads.report", skip_all, fields(since = %request.since))]
    async fn stage_object_sync_report(&self, request: &ObjectSyncRequest) -> Result<SyncReport> {
        // Opt-out drives the do-not-contact fields
        let mut fields = request.fields.clone();
        if !fields.iter().any(|f| f == FIELD_EMAIL_OPTOUT) {
            fields.push(FIELD_EMAIL_OPTOUT.to_string());
        }

        let records = self.general.read(request.since, &fields).await?;
        let module = self.general.module_info().await?;

        let mut builder = SyncReportBuilder::new();
        for record in &records {
            self.general
                .append_to_report(&mut builder, module, record, &fields)?;
        }

        let report = builder.build();
        info!(
            integration = %self.general.integration(),
            object = %RemoteObject::Leads,
            changes = report.objects.len(),
            "Built lead sync report"
        );
        Ok(report)
    }

    /// Leads are never reclassified
    async fn commit_reclassifications(
        &self,
        pending: Vec<Reclassification>,
    ) -> Result<Vec<Reclassification>> {
        if pending.is_empty() {
            Ok(Vec::new())
        } else {
            Err(SyncError::Unsupported {
                operation: "reclassify Leads records".to_string(),
            })
        }
    }

    #[tracing::instrument(name = "exchange.leads.insert", skip_all, fields(count = changes.len()))]
    async fn insert(&self, changes: &mut [OrderChange]) -> Result<Vec<IdentityMapping>> {
        self.general.insert_internal(changes).await
    }

    #[tracing::instrument(name = "exchange.leads.update", skip_all, fields(count = changes.len()))]
    async fn update(&self, ids: &[String], changes: &[OrderChange]) -> Result<Vec<UpdatedObjectMapping>> {
        self.general.update_internal(ids, changes).await
    }

    async fn delete(&self, _changes: &[OrderChange]) -> Result<()> {
        Err(self.general.unsupported_delete())
    }
}
