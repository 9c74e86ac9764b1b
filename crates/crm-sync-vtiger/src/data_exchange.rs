//! Entry point the host talks to: one exchange per CRM module behind a
//! single facade

use std::sync::Arc;
use tracing::info;

use crm_sync::exchange::{ObjectSyncDataExchange, ObjectSyncRequest};
use crm_sync::local_directory::LocalContactFinder;
use crm_sync::mapping_store::MappingStore;
use crm_sync::reclassify::ReclassificationResolver;
use crm_sync_api::{
    IdentityMapping, OrderChange, RemoteObject, Result, SyncReport, UpdatedObjectMapping,
};

use crate::client::VtigerClient;
use crate::contact_exchange::ContactDataExchange;
use crate::general_exchange::GeneralDataExchange;
use crate::lead_exchange::LeadDataExchange;
use crate::settings::SettingProvider;
use crate::validator::ObjectValidator;

pub struct VtigerSyncDataExchange {
    integration: String,
    contacts: ContactDataExchange,
    leads: LeadDataExchange,
}

impl VtigerSyncDataExchange {
    pub fn new(
        client: Arc<dyn VtigerClient>,
        settings: Arc<dyn SettingProvider>,
        mappings: Arc<dyn MappingStore>,
        local_contacts: Arc<dyn LocalContactFinder>,
    ) -> Self {
        let integration = settings.integration_name().to_string();
        let validator = Arc::new(ObjectValidator::new(
            client.clone(),
            settings.request_timeout(),
        ));
        let general = |object| {
            GeneralDataExchange::new(
                object,
                client.clone(),
                settings.clone(),
                mappings.clone(),
                validator.clone(),
            )
        };

        let resolver =
            ReclassificationResolver::new(integration.clone(), mappings.clone(), local_contacts);
        Self {
            contacts: ContactDataExchange::new(general(RemoteObject::Contacts), resolver),
            leads: LeadDataExchange::new(general(RemoteObject::Leads)),
            integration,
        }
    }

    pub fn integration(&self) -> &str {
        &self.integration
    }

    pub fn exchange(&self, object: RemoteObject) -> &dyn ObjectSyncDataExchange {
        match object {
            RemoteObject::Contacts => &self.contacts,
            RemoteObject::Leads => &self.leads,
        }
    }

    /// Reports of every requested object, concatenated in request order.
    ///
    /// Every object is read and normalized before any reclassification is
    /// committed, so a run that fails on any object leaves the identity
    /// mappings untouched.
    #[tracing::instrument(name = "exchange.vtiger.report", skip_all, fields(integration = %self.integration))]
    pub async fn get_sync_report(&self, requests: &[ObjectSyncRequest]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for request in requests {
            let staged = self
                .exchange(request.object)
                .stage_object_sync_report(request)
                .await?;
            report.extend(staged);
        }

        // Only contacts are ever reclassified
        let pending = std::mem::take(&mut report.reclassified);
        report.reclassified = self.contacts.commit_reclassifications(pending).await?;

        info!(
            integration = %self.integration,
            objects = requests.len(),
            changes = report.objects.len(),
            reclassified = report.reclassified.len(),
            "Built sync report"
        );
        Ok(report)
    }

    pub async fn insert(
        &self,
        object: RemoteObject,
        changes: &mut [OrderChange],
    ) -> Result<Vec<IdentityMapping>> {
        self.exchange(object).insert(changes).await
    }

    pub async fn update(
        &self,
        object: RemoteObject,
        ids: &[String],
        changes: &[OrderChange],
    ) -> Result<Vec<UpdatedObjectMapping>> {
        self.exchange(object).update(ids, changes).await
    }

    pub async fn delete(&self, object: RemoteObject, changes: &[OrderChange]) -> Result<()> {
        self.exchange(object).delete(changes).await
    }
}
