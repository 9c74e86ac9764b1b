//! Fake CRM for tests and offline runs
//!
//! Keeps modules in memory and answers the same calls as a real client:
//! - queries filter on `modifiedtime` strictly greater than the watermark,
//!   order by modification time then id, and honor offset/limit
//! - creates assign ids in the CRM's `<module>x<n>` form
//! - scripted failures: rejected emails fail validation, outage mode makes
//!   every call fail with `SourceUnavailable`, latency delays every call

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crm_sync_api::{RemoteObject, Result, SyncError};

use crate::client::{RecordQuery, VtigerClient};
use crate::models::{
    format_remote_datetime, parse_remote_datetime, BaseModel, FieldMap, ModelFactory,
    ModuleFieldInfo, ModuleInfo, VtigerRecord, VtigerUser, FIELD_EMAIL, FIELD_ID,
    FIELD_MODIFIED_TIME,
};

#[derive(Debug)]
struct ModuleState {
    info: ModuleInfo,
    id_prefix: u32,
    next_id: u64,
    records: Vec<FieldMap>,
}

pub struct FakeVtigerClient {
    modules: RwLock<HashMap<RemoteObject, ModuleState>>,
    users: RwLock<Vec<VtigerUser>>,
    rejected_emails: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
    query_count: AtomicUsize,
}

impl Default for FakeVtigerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeVtigerClient {
    /// Fake with the standard Contacts and Leads descriptions and one user
    /// (`19x1`)
    pub fn new() -> Self {
        let mut modules = HashMap::new();
        modules.insert(
            RemoteObject::Contacts,
            ModuleState {
                info: contacts_description(),
                id_prefix: 12,
                next_id: 1,
                records: Vec::new(),
            },
        );
        modules.insert(
            RemoteObject::Leads,
            ModuleState {
                info: leads_description(),
                id_prefix: 10,
                next_id: 1,
                records: Vec::new(),
            },
        );

        Self {
            modules: RwLock::new(modules),
            users: RwLock::new(vec![VtigerUser {
                id: "19x1".to_string(),
                user_name: "admin".to_string(),
            }]),
            rejected_emails: RwLock::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            latency: RwLock::new(None),
            query_count: AtomicUsize::new(0),
        }
    }

    /// Store a record as-is; it must carry `id` and `modifiedtime`
    pub async fn seed(&self, object: RemoteObject, record: FieldMap) {
        let mut modules = self.modules.write().await;
        if let Some(module) = modules.get_mut(&object) {
            module.records.push(record);
        }
    }

    pub async fn record(&self, object: RemoteObject, id: &str) -> Option<FieldMap> {
        let modules = self.modules.read().await;
        modules.get(&object).and_then(|m| {
            m.records
                .iter()
                .find(|r| r.get(FIELD_ID).and_then(|v| v.as_str()) == Some(id))
                .cloned()
        })
    }

    pub async fn record_count(&self, object: RemoteObject) -> usize {
        let modules = self.modules.read().await;
        modules.get(&object).map(|m| m.records.len()).unwrap_or(0)
    }

    /// Add (or replace) a field description
    pub async fn describe_field(&self, object: RemoteObject, field: ModuleFieldInfo) {
        let mut modules = self.modules.write().await;
        if let Some(module) = modules.get_mut(&object) {
            module.info.fields.retain(|f| f.name != field.name);
            module.info.fields.push(field);
        }
    }

    pub async fn add_user(&self, id: &str, user_name: &str) {
        self.users.write().await.push(VtigerUser {
            id: id.to_string(),
            user_name: user_name.to_string(),
        });
    }

    /// Creates and updates of records carrying this email fail validation
    pub async fn reject_email(&self, email: &str) {
        self.rejected_emails.write().await.insert(email.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write().await = latency;
    }

    pub fn query_count(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    async fn enter(&self, operation: &str) -> Result<()> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::source_unavailable(format!(
                "{}: CRM is not reachable",
                operation
            )));
        }
        Ok(())
    }

    async fn check_rejected(&self, record: &VtigerRecord) -> Result<()> {
        let email = record.model().email();
        if let Some(email) = email.as_str() {
            if self.rejected_emails.read().await.contains(email) {
                return Err(SyncError::remote_validation(format!(
                    "Email '{}' was rejected",
                    email
                )));
            }
        }
        Ok(())
    }
}

fn now_in_seconds() -> String {
    format_remote_datetime(&Utc::now())
}

fn sort_key(record: &FieldMap, field: &str) -> String {
    record
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn modified_after(record: &FieldMap, watermark: &DateTime<Utc>) -> bool {
    record
        .get(FIELD_MODIFIED_TIME)
        .and_then(|v| v.as_str())
        .and_then(|raw| parse_remote_datetime(raw).ok())
        .is_some_and(|modified| modified > *watermark)
}

#[async_trait]
impl VtigerClient for FakeVtigerClient {
    async fn describe(&self, object: RemoteObject) -> Result<ModuleInfo> {
        self.enter("describe").await?;
        let modules = self.modules.read().await;
        modules
            .get(&object)
            .map(|m| m.info.clone())
            .ok_or_else(|| SyncError::source_unavailable(format!("Unknown module {}", object)))
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<FieldMap>> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.enter("query").await?;

        let modules = self.modules.read().await;
        let Some(module) = modules.get(&query.object) else {
            return Ok(Vec::new());
        };

        let mut matching: Vec<&FieldMap> = module
            .records
            .iter()
            .filter(|r| modified_after(r, &query.modified_after))
            .collect();
        matching.sort_by_key(|r| (sort_key(r, FIELD_MODIFIED_TIME), sort_key(r, FIELD_ID)));

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|r| {
                query
                    .fields
                    .iter()
                    .filter_map(|f| r.get(f).map(|v| (f.clone(), v.clone())))
                    .collect()
            })
            .collect())
    }

    async fn create(&self, record: &VtigerRecord) -> Result<VtigerRecord> {
        self.enter("create").await?;
        self.check_rejected(record).await?;

        let object = record.model().object();
        let mut modules = self.modules.write().await;
        let module = modules
            .get_mut(&object)
            .ok_or_else(|| SyncError::source_unavailable(format!("Unknown module {}", object)))?;

        let id = format!("{}x{}", module.id_prefix, module.next_id);
        module.next_id += 1;

        let mut data = record.model().data().clone();
        data.insert(FIELD_ID.to_string(), serde_json::Value::String(id));
        data.insert(
            FIELD_MODIFIED_TIME.to_string(),
            serde_json::Value::String(now_in_seconds()),
        );
        module.records.push(data.clone());
        Ok(ModelFactory::create(object, data))
    }

    async fn update(&self, record: &VtigerRecord) -> Result<VtigerRecord> {
        self.enter("update").await?;
        self.check_rejected(record).await?;

        let object = record.model().object();
        let id = record
            .model()
            .id()
            .ok_or_else(|| SyncError::remote_validation("Record id is required for update"))?
            .to_string();

        let mut modules = self.modules.write().await;
        let stored = modules
            .get_mut(&object)
            .and_then(|m| {
                m.records
                    .iter_mut()
                    .find(|r| r.get(FIELD_ID).and_then(|v| v.as_str()) == Some(id.as_str()))
            })
            .ok_or_else(|| {
                SyncError::remote_validation(format!("{} record {} does not exist", object, id))
            })?;

        for (name, value) in record.model().data() {
            stored.insert(name.clone(), value.clone());
        }
        stored.insert(
            FIELD_MODIFIED_TIME.to_string(),
            serde_json::Value::String(now_in_seconds()),
        );
        Ok(ModelFactory::create(object, stored.clone()))
    }

    async fn list_users(&self) -> Result<Vec<VtigerUser>> {
        self.enter("list_users").await?;
        Ok(self.users.read().await.clone())
    }
}

fn common_fields() -> Vec<ModuleFieldInfo> {
    vec![
        ModuleFieldInfo::new(FIELD_ID, "autogenerated"),
        ModuleFieldInfo::new(FIELD_MODIFIED_TIME, "datetime"),
        ModuleFieldInfo::new("firstname", "string"),
        ModuleFieldInfo::new("lastname", "string").required(),
        ModuleFieldInfo::new(FIELD_EMAIL, "email"),
        ModuleFieldInfo::new("phone", "phone"),
        ModuleFieldInfo::new("emailoptout", "boolean"),
        ModuleFieldInfo::new("leadsource", "picklist"),
        ModuleFieldInfo::new("description", "text"),
        ModuleFieldInfo::new("assigned_user_id", "owner").required(),
    ]
}

fn contacts_description() -> ModuleInfo {
    let mut fields = common_fields();
    fields.extend([
        ModuleFieldInfo::new("contact_no", "autogenerated"),
        ModuleFieldInfo::new("donotcall", "boolean"),
        ModuleFieldInfo::new("isconvertedfromlead", "boolean"),
        ModuleFieldInfo::new("reference", "boolean"),
        ModuleFieldInfo::new("source", "string"),
        ModuleFieldInfo::new("contact_id", "reference"),
        ModuleFieldInfo::new("account_id", "reference"),
    ]);
    ModuleInfo {
        name: RemoteObject::Contacts.module_name().to_string(),
        fields,
    }
}

fn leads_description() -> ModuleInfo {
    let mut fields = common_fields();
    fields.extend([
        ModuleFieldInfo::new("lead_no", "autogenerated"),
        ModuleFieldInfo::new("company", "string"),
    ]);
    ModuleInfo {
        name: RemoteObject::Leads.module_name().to_string(),
        fields,
    }
}
