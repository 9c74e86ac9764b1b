#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crm_sync::exchange::ObjectSyncRequest;
use crm_sync::local_directory::MemoryContactDirectory;
use crm_sync::mapping_store::MemoryMappingStore;
use crm_sync_api::{IdentityMapping, OrderChange, RemoteObject, Value, LOCAL_CONTACT_OBJECT};
use crm_sync_vtiger::models::{parse_remote_datetime, FieldMap};
use crm_sync_vtiger::{FakeVtigerClient, VtigerSettings, VtigerSyncDataExchange};

pub const INTEGRATION: &str = "VtigerCrm";

pub struct Harness {
    pub fake: Arc<FakeVtigerClient>,
    pub mappings: Arc<MemoryMappingStore>,
    pub directory: Arc<MemoryContactDirectory>,
    pub exchange: VtigerSyncDataExchange,
}

impl Harness {
    pub fn new(settings: VtigerSettings) -> Self {
        Self::with_mappings(settings, Vec::new())
    }

    pub fn with_mappings(settings: VtigerSettings, mappings: Vec<IdentityMapping>) -> Self {
        crm_sync::telemetry::init_tracing("warn");
        let fake = Arc::new(FakeVtigerClient::new());
        let mappings = Arc::new(MemoryMappingStore::with_mappings(mappings));
        let directory = Arc::new(MemoryContactDirectory::new());
        let exchange = VtigerSyncDataExchange::new(
            fake.clone(),
            Arc::new(settings),
            mappings.clone(),
            directory.clone(),
        );
        Self {
            fake,
            mappings,
            directory,
            exchange,
        }
    }
}

pub fn ts(raw: &str) -> DateTime<Utc> {
    parse_remote_datetime(raw).expect("valid CRM timestamp")
}

pub fn watermark() -> DateTime<Utc> {
    ts("2024-01-01 00:00:00")
}

pub fn request(object: RemoteObject, fields: &[&str]) -> ObjectSyncRequest {
    ObjectSyncRequest {
        object,
        since: watermark(),
        fields: fields.iter().map(|f| f.to_string()).collect(),
    }
}

pub fn record(id: &str, modified: &str, pairs: &[(&str, serde_json::Value)]) -> FieldMap {
    let mut data: FieldMap = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    data.insert("id".to_string(), json!(id));
    data.insert("modifiedtime".to_string(), json!(modified));
    data.entry("lastname".to_string()).or_insert(json!("Doe"));
    data.entry("assigned_user_id".to_string())
        .or_insert(json!("19x1"));
    data
}

pub fn lead_mapping(remote_id: &str, local_id: &str) -> IdentityMapping {
    IdentityMapping {
        integration: INTEGRATION.to_string(),
        remote_object: RemoteObject::Leads,
        remote_id: remote_id.to_string(),
        local_object: LOCAL_CONTACT_OBJECT.to_string(),
        local_id: local_id.to_string(),
        last_sync: ts("2023-12-01 00:00:00"),
    }
}

pub fn order(
    object: RemoteObject,
    local_id: &str,
    remote_id: Option<&str>,
    fields: &[(&str, Value)],
) -> OrderChange {
    OrderChange {
        integration: INTEGRATION.to_string(),
        remote_object: object,
        remote_id: remote_id.map(str::to_string),
        local_object: LOCAL_CONTACT_OBJECT.to_string(),
        local_id: local_id.to_string(),
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}
