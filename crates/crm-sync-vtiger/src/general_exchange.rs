//! Behavior shared by the Contacts and Leads exchanges: reading and
//! normalizing changed records, building CRM payloads, and the per-record
//! update/insert loops.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crm_sync::mapping_store::MappingStore;
use crm_sync::normalizer::ValueNormalizer;
use crm_sync::report_builder::{attach_do_not_contact, SyncReportBuilder};
use crm_sync_api::{
    IdentityMapping, NormalizedField, ObjectChange, OrderChange, RemoteObject, Result, SyncError,
    UpdatedObjectMapping, DNC_EMAIL_FIELD, DNC_SMS_FIELD,
};

use crate::client::{with_timeout, VtigerClient};
use crate::models::{
    BaseModel, FieldMap, ModelFactory, ModuleInfo, VtigerRecord, FIELD_EMAIL_OPTOUT, FIELD_ID,
};
use crate::reader::ChangeReader;
use crate::settings::SettingProvider;
use crate::validator::ObjectValidator;

pub struct GeneralDataExchange {
    object: RemoteObject,
    client: Arc<dyn VtigerClient>,
    settings: Arc<dyn SettingProvider>,
    mappings: Arc<dyn MappingStore>,
    validator: Arc<ObjectValidator>,
    reader: ChangeReader,
    normalizer: ValueNormalizer,
    module: OnceCell<ModuleInfo>,
}

impl GeneralDataExchange {
    pub fn new(
        object: RemoteObject,
        client: Arc<dyn VtigerClient>,
        settings: Arc<dyn SettingProvider>,
        mappings: Arc<dyn MappingStore>,
        validator: Arc<ObjectValidator>,
    ) -> Self {
        let reader = ChangeReader::new(
            client.clone(),
            settings.query_limit(),
            settings.request_timeout(),
        );
        Self {
            object,
            client,
            settings,
            mappings,
            validator,
            reader,
            normalizer: ValueNormalizer::new(),
            module: OnceCell::new(),
        }
    }

    pub fn object(&self) -> RemoteObject {
        self.object
    }

    pub fn integration(&self) -> &str {
        self.settings.integration_name()
    }

    pub fn settings(&self) -> &dyn SettingProvider {
        self.settings.as_ref()
    }

    /// Module description, fetched once per exchange
    pub async fn module_info(&self) -> Result<&ModuleInfo> {
        self.module
            .get_or_try_init(|| {
                with_timeout(
                    self.settings.request_timeout(),
                    "describe",
                    self.client.describe(self.object),
                )
            })
            .await
    }

    pub async fn read(&self, since: DateTime<Utc>, fields: &[String]) -> Result<Vec<VtigerRecord>> {
        self.reader.read_changes(self.object, since, fields).await
    }

    /// Normalize the requested fields of one record and add the
    /// do-not-contact fields
    pub fn normalize_record(
        &self,
        module: &ModuleInfo,
        record: &VtigerRecord,
        fields: &[String],
    ) -> Result<ObjectChange> {
        let model = record.model();
        let remote_id = model.id().ok_or_else(|| SyncError::InvalidObject {
            object: module.name.clone(),
            field: FIELD_ID.to_string(),
            reason: "Record has no id".to_string(),
        })?;

        let mut change = ObjectChange::new(self.object, remote_id, model.modified_time()?);
        for (name, raw) in model.dehydrate(fields) {
            let field_type = module.field_type(&name)?;
            let value = self.normalizer.normalize_for_local(field_type, &raw)?;
            change.add_field(NormalizedField::new(name, value));
        }
        attach_do_not_contact(&mut change, &self.normalizer, &model.email_optout())?;
        Ok(change)
    }

    /// Normalize a record into the report. Record-level failures are logged
    /// and the record left out; anything else stops the report.
    pub fn append_to_report(
        &self,
        builder: &mut SyncReportBuilder,
        module: &ModuleInfo,
        record: &VtigerRecord,
        fields: &[String],
    ) -> Result<()> {
        match self.normalize_record(module, record, fields) {
            Ok(change) => {
                builder.add_object(change);
                Ok(())
            }
            Err(e) if e.is_record_level() => {
                warn!(
                    integration = %self.integration(),
                    object = %self.object,
                    remote_id = record.model().id().unwrap_or_default(),
                    outcome = "skipped",
                    error = %e,
                    "Record left out of sync report"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Convert host values into a CRM record of this exchange's module
    pub fn build_payload(&self, module: &ModuleInfo, change: &OrderChange) -> Result<VtigerRecord> {
        let mut data = FieldMap::new();
        for (name, value) in &change.fields {
            let target = match name.as_str() {
                DNC_EMAIL_FIELD => FIELD_EMAIL_OPTOUT,
                DNC_SMS_FIELD => continue,
                other => other,
            };
            let info = module.field(target).ok_or_else(|| SyncError::InvalidObject {
                object: module.name.clone(),
                field: target.to_string(),
                reason: "Field is not described by the module".to_string(),
            })?;
            let wire = self.normalizer.normalize_for_remote(info.field_type()?, value)?;
            data.insert(target.to_string(), wire);
        }
        if let Some(remote_id) = &change.remote_id {
            data.insert(
                FIELD_ID.to_string(),
                serde_json::Value::String(remote_id.clone()),
            );
        }
        Ok(ModelFactory::create(self.object, data))
    }

    /// Push updates for the changes whose remote id is listed in `ids`
    pub async fn update_internal(
        &self,
        ids: &[String],
        changes: &[OrderChange],
    ) -> Result<Vec<UpdatedObjectMapping>> {
        let module = self.module_info().await?;
        let forced_owner = if self.settings.should_update_owner() {
            self.settings.owner()
        } else {
            None
        };

        let mut updated = Vec::with_capacity(changes.len());
        for change in changes {
            let Some(remote_id) = change.remote_id.as_deref() else {
                warn!(
                    integration = %self.integration(),
                    object = %self.object,
                    local_id = %change.local_id,
                    outcome = "skipped",
                    "Update without remote id"
                );
                continue;
            };
            if !ids.iter().any(|id| id == remote_id) {
                debug!(
                    integration = %self.integration(),
                    object = %self.object,
                    remote_id,
                    "Change not listed for update"
                );
                continue;
            }

            match self.update_one(module, change, forced_owner).await {
                Ok(stored) => {
                    let modified_time = self.stored_modified_time(&stored, remote_id);
                    self.mappings
                        .upsert_mapping(IdentityMapping {
                            integration: self.integration().to_string(),
                            remote_object: self.object,
                            remote_id: remote_id.to_string(),
                            local_object: change.local_object.clone(),
                            local_id: change.local_id.clone(),
                            last_sync: modified_time,
                        })
                        .await?;
                    info!(
                        integration = %self.integration(),
                        object = %self.object,
                        remote_id,
                        outcome = "updated",
                        "Updated CRM record"
                    );
                    updated.push(UpdatedObjectMapping {
                        remote_object: self.object,
                        remote_id: remote_id.to_string(),
                        local_object: change.local_object.clone(),
                        local_id: change.local_id.clone(),
                        modified_time,
                    });
                }
                Err(e) if e.is_record_level() => {
                    warn!(
                        integration = %self.integration(),
                        object = %self.object,
                        remote_id,
                        outcome = "failed",
                        error = %e,
                        "Update rejected, skipping record"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    /// Modified time the CRM reported for a stored record. The write has
    /// already happened, so an unreadable time falls back to now instead of
    /// failing the batch.
    fn stored_modified_time(&self, stored: &VtigerRecord, remote_id: &str) -> DateTime<Utc> {
        stored.model().modified_time().unwrap_or_else(|e| {
            warn!(
                integration = %self.integration(),
                object = %self.object,
                remote_id,
                error = %e,
                "CRM response has no usable modified time"
            );
            Utc::now()
        })
    }

    async fn update_one(
        &self,
        module: &ModuleInfo,
        change: &OrderChange,
        forced_owner: Option<&str>,
    ) -> Result<VtigerRecord> {
        let mut record = self.build_payload(module, change)?;
        if let Some(owner) = forced_owner {
            record.model_mut().set_assigned_user_id(owner);
        }
        self.validator.validate(&record, module).await?;
        with_timeout(
            self.settings.request_timeout(),
            "update",
            self.client.update(&record),
        )
        .await
    }

    /// Create the records; each created change gets its remote id filled in.
    ///
    /// Fails before touching the CRM when no owner is configured.
    pub async fn insert_internal(&self, changes: &mut [OrderChange]) -> Result<Vec<IdentityMapping>> {
        let owner = self
            .settings
            .owner()
            .ok_or_else(|| SyncError::configuration("Owner is not configured for new records"))?;
        let module = self.module_info().await?;

        let mut created = Vec::with_capacity(changes.len());
        for change in changes.iter_mut() {
            match self.insert_one(module, change, owner).await {
                Ok(stored) => {
                    let Some(remote_id) = stored.model().id().map(str::to_string) else {
                        warn!(
                            integration = %self.integration(),
                            object = %self.object,
                            local_id = %change.local_id,
                            outcome = "failed",
                            "Created record came back without an id, cannot map it"
                        );
                        continue;
                    };
                    let last_sync = self.stored_modified_time(&stored, &remote_id);
                    let outcome = self
                        .mappings
                        .upsert_mapping(IdentityMapping {
                            integration: self.integration().to_string(),
                            remote_object: self.object,
                            remote_id: remote_id.clone(),
                            local_object: change.local_object.clone(),
                            local_id: change.local_id.clone(),
                            last_sync,
                        })
                        .await?;
                    info!(
                        integration = %self.integration(),
                        object = %self.object,
                        remote_id = %remote_id,
                        local_id = %change.local_id,
                        outcome = "created",
                        "Created CRM record"
                    );
                    change.remote_id = Some(remote_id);
                    created.push(outcome.into_mapping());
                }
                Err(e) if e.is_record_level() => {
                    warn!(
                        integration = %self.integration(),
                        object = %self.object,
                        local_id = %change.local_id,
                        outcome = "failed",
                        error = %e,
                        "Create rejected, skipping record"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    async fn insert_one(
        &self,
        module: &ModuleInfo,
        change: &OrderChange,
        owner: &str,
    ) -> Result<VtigerRecord> {
        let new_record = OrderChange {
            remote_id: None,
            ..change.clone()
        };
        let mut record = self.build_payload(module, &new_record)?;
        record.model_mut().set_assigned_user_id(owner);
        self.validator.validate(&record, module).await?;
        with_timeout(
            self.settings.request_timeout(),
            "create",
            self.client.create(&record),
        )
        .await
    }

    pub fn unsupported_delete(&self) -> SyncError {
        SyncError::Unsupported {
            operation: format!("delete {} records", self.object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeVtigerClient;
    use crate::models::parse_remote_datetime;
    use crate::settings::VtigerSettings;
    use crm_sync::mapping_store::MemoryMappingStore;
    use crm_sync_api::{FieldType, Value, LOCAL_CONTACT_OBJECT};
    use serde_json::json;
    use std::time::Duration;

    fn exchange(
        fake: Arc<FakeVtigerClient>,
        settings: VtigerSettings,
    ) -> (GeneralDataExchange, Arc<MemoryMappingStore>) {
        exchange_with(fake, settings)
    }

    fn exchange_with(
        client: Arc<dyn VtigerClient>,
        settings: VtigerSettings,
    ) -> (GeneralDataExchange, Arc<MemoryMappingStore>) {
        let mappings = Arc::new(MemoryMappingStore::new());
        let validator = Arc::new(ObjectValidator::new(client.clone(), Duration::from_secs(5)));
        let exchange = GeneralDataExchange::new(
            RemoteObject::Leads,
            client,
            Arc::new(settings),
            mappings.clone(),
            validator,
        );
        (exchange, mappings)
    }

    /// Fake whose responses for one record come back incomplete: created
    /// records lose their id, updated records lose their modified time
    struct IncompleteResponses {
        inner: Arc<FakeVtigerClient>,
        remote_id: String,
    }

    impl IncompleteResponses {
        fn strip(&self, mut stored: VtigerRecord, field: &str) -> VtigerRecord {
            if stored.model().id() == Some(self.remote_id.as_str()) {
                stored.model_mut().data_mut().remove(field);
            }
            stored
        }
    }

    #[async_trait::async_trait]
    impl VtigerClient for IncompleteResponses {
        async fn describe(&self, object: RemoteObject) -> Result<ModuleInfo> {
            self.inner.describe(object).await
        }

        async fn query(&self, query: &crate::client::RecordQuery) -> Result<Vec<FieldMap>> {
            self.inner.query(query).await
        }

        async fn create(&self, record: &VtigerRecord) -> Result<VtigerRecord> {
            let stored = self.inner.create(record).await?;
            Ok(self.strip(stored, FIELD_ID))
        }

        async fn update(&self, record: &VtigerRecord) -> Result<VtigerRecord> {
            let stored = self.inner.update(record).await?;
            Ok(self.strip(stored, crate::models::FIELD_MODIFIED_TIME))
        }

        async fn list_users(&self) -> Result<Vec<crate::models::VtigerUser>> {
            self.inner.list_users().await
        }
    }

    fn lead_row(id: &str) -> FieldMap {
        [
            ("id".to_string(), json!(id)),
            ("modifiedtime".to_string(), json!("2024-01-02 00:00:00")),
            ("lastname".to_string(), json!("Doe")),
            ("assigned_user_id".to_string(), json!("19x1")),
        ]
        .into_iter()
        .collect()
    }

    fn order(local_id: &str, remote_id: Option<&str>, fields: &[(&str, Value)]) -> OrderChange {
        OrderChange {
            integration: "VtigerCrm".to_string(),
            remote_object: RemoteObject::Leads,
            remote_id: remote_id.map(str::to_string),
            local_object: LOCAL_CONTACT_OBJECT.to_string(),
            local_id: local_id.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_normalize_record_uses_described_types() {
        let fake = Arc::new(FakeVtigerClient::new());
        let (exchange, _) = exchange(fake, VtigerSettings::default());
        let module = exchange.module_info().await.unwrap().clone();
        let record = ModelFactory::create(
            RemoteObject::Leads,
            [
                ("id".to_string(), json!("10x1")),
                ("modifiedtime".to_string(), json!("2024-01-02 00:00:00")),
                ("email".to_string(), json!(" a@x.com ")),
                ("emailoptout".to_string(), json!("0")),
            ]
            .into_iter()
            .collect(),
        );
        let change = exchange
            .normalize_record(&module, &record, &["email".to_string(), "lastname".to_string()])
            .unwrap();

        assert_eq!(change.remote_id, "10x1");
        assert_eq!(
            change.modified_time,
            parse_remote_datetime("2024-01-02 00:00:00").unwrap()
        );
        let names: Vec<_> = change.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["email", "lastname", DNC_EMAIL_FIELD, DNC_SMS_FIELD]);
        assert_eq!(
            change.field("email").unwrap().value.normalized,
            Value::String("a@x.com".to_string())
        );
        assert_eq!(change.field("lastname").unwrap().value.normalized, Value::Null);
        assert_eq!(
            change.field(DNC_SMS_FIELD).unwrap().value.field_type,
            FieldType::DoNotContact
        );
    }

    #[tokio::test]
    async fn test_undescribed_requested_field_is_configuration_error() {
        let fake = Arc::new(FakeVtigerClient::new());
        let (exchange, _) = exchange(fake, VtigerSettings::default());
        let module = exchange.module_info().await.unwrap().clone();
        let record = ModelFactory::create(
            RemoteObject::Leads,
            [
                ("id".to_string(), json!("10x1")),
                ("modifiedtime".to_string(), json!("2024-01-02 00:00:00")),
            ]
            .into_iter()
            .collect(),
        );
        let err = exchange
            .normalize_record(&module, &record, &["shoe_size".to_string()])
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));

        let mut builder = SyncReportBuilder::new();
        assert!(exchange
            .append_to_report(&mut builder, &module, &record, &["shoe_size".to_string()])
            .is_err());
    }

    #[tokio::test]
    async fn test_build_payload_converts_to_wire_values() {
        let fake = Arc::new(FakeVtigerClient::new());
        let (exchange, _) = exchange(fake, VtigerSettings::default());
        let module = exchange.module_info().await.unwrap().clone();
        let record = exchange
            .build_payload(
                &module,
                &order(
                    "7",
                    Some("10x3"),
                    &[
                        ("lastname", Value::from("Doe")),
                        (DNC_EMAIL_FIELD, Value::Boolean(true)),
                        (DNC_SMS_FIELD, Value::Boolean(false)),
                    ],
                ),
            )
            .unwrap();

        let data = record.model().data();
        assert_eq!(data["lastname"], json!("Doe"));
        assert_eq!(data["emailoptout"], json!("1"));
        assert_eq!(data["id"], json!("10x3"));
        assert!(!data.contains_key(DNC_SMS_FIELD));
    }

    #[tokio::test]
    async fn test_insert_fills_remote_id_and_maps() {
        let fake = Arc::new(FakeVtigerClient::new());
        let (exchange, mappings) =
            exchange(fake.clone(), VtigerSettings::default().with_owner("19x1"));
        let mut changes = vec![order("7", None, &[("lastname", Value::from("Doe"))])];

        let created = exchange.insert_internal(&mut changes).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(changes[0].remote_id.as_deref(), Some("10x1"));
        assert_eq!(created[0].local_id, "7");
        assert_eq!(mappings.len().await, 1);

        let stored = fake.record(RemoteObject::Leads, "10x1").await.unwrap();
        assert_eq!(stored["assigned_user_id"], json!("19x1"));
    }

    #[tokio::test]
    async fn test_update_forces_owner_when_configured() {
        let fake = Arc::new(FakeVtigerClient::new());
        fake.add_user("19x2", "sales").await;
        fake.seed(
            RemoteObject::Leads,
            [
                ("id".to_string(), json!("10x1")),
                ("modifiedtime".to_string(), json!("2024-01-02 00:00:00")),
                ("lastname".to_string(), json!("Doe")),
                ("assigned_user_id".to_string(), json!("19x1")),
            ]
            .into_iter()
            .collect(),
        )
        .await;
        let mut settings = VtigerSettings::default().with_owner("19x2");
        settings.update_owner = true;
        let (exchange, _) = exchange(fake.clone(), settings);

        let updated = exchange
            .update_internal(
                &["10x1".to_string()],
                &[order("7", Some("10x1"), &[("lastname", Value::from("Roe"))])],
            )
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);

        let stored = fake.record(RemoteObject::Leads, "10x1").await.unwrap();
        assert_eq!(stored["assigned_user_id"], json!("19x2"));
        assert_eq!(stored["lastname"], json!("Roe"));
    }

    #[tokio::test]
    async fn test_update_without_modified_time_in_response_keeps_going() {
        let fake = Arc::new(FakeVtigerClient::new());
        for id in ["10x1", "10x2", "10x3"] {
            fake.seed(RemoteObject::Leads, lead_row(id)).await;
        }
        let client = Arc::new(IncompleteResponses {
            inner: fake.clone(),
            remote_id: "10x2".to_string(),
        });
        let (exchange, mappings) = exchange_with(client, VtigerSettings::default());

        let ids: Vec<String> = ["10x1", "10x2", "10x3"].iter().map(|s| s.to_string()).collect();
        let changes: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| order(&i.to_string(), Some(id.as_str()), &[("lastname", Value::from("Roe"))]))
            .collect();

        let updated = exchange.update_internal(&ids, &changes).await.unwrap();
        let updated_ids: Vec<_> = updated.iter().map(|u| u.remote_id.as_str()).collect();
        assert_eq!(updated_ids, vec!["10x1", "10x2", "10x3"]);
        assert_eq!(mappings.len().await, 3);

        let last = fake.record(RemoteObject::Leads, "10x3").await.unwrap();
        assert_eq!(last["lastname"], json!("Roe"));
    }

    #[tokio::test]
    async fn test_insert_without_id_in_response_keeps_going() {
        let fake = Arc::new(FakeVtigerClient::new());
        let client = Arc::new(IncompleteResponses {
            inner: fake.clone(),
            remote_id: "10x1".to_string(),
        });
        let (exchange, mappings) =
            exchange_with(client, VtigerSettings::default().with_owner("19x1"));
        let mut changes = vec![
            order("1", None, &[("lastname", Value::from("Doe"))]),
            order("2", None, &[("lastname", Value::from("Roe"))]),
        ];

        let created = exchange.insert_internal(&mut changes).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].remote_id, "10x2");
        assert!(changes[0].remote_id.is_none());
        assert_eq!(changes[1].remote_id.as_deref(), Some("10x2"));
        assert_eq!(mappings.len().await, 1);
    }
}
