use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crm_sync::normalizer::REMOTE_DATETIME_FORMAT;
use crm_sync_api::{FieldType, RemoteObject, Result, SyncError};

/// Raw field values of one CRM record, as sent over the wire
pub type FieldMap = BTreeMap<String, serde_json::Value>;

pub const FIELD_ID: &str = "id";
pub const FIELD_MODIFIED_TIME: &str = "modifiedtime";
pub const FIELD_ASSIGNED_USER: &str = "assigned_user_id";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_EMAIL_OPTOUT: &str = "emailoptout";
pub const FIELD_CONVERTED_FROM_LEAD: &str = "isconvertedfromlead";

/// Type descriptor nested in a field description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTypeInfo {
    pub name: String,
}

/// One field of a module description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleFieldInfo {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(rename = "type")]
    pub type_info: FieldTypeInfo,
}

fn default_nullable() -> bool {
    true
}

impl ModuleFieldInfo {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            label: name.to_string(),
            mandatory: false,
            nullable: true,
            type_info: FieldTypeInfo {
                name: type_name.to_string(),
            },
        }
    }

    pub fn required(mut self) -> Self {
        self.mandatory = true;
        self.nullable = false;
        self
    }

    pub fn field_type(&self) -> Result<FieldType> {
        FieldType::from_name(&self.type_info.name)
    }
}

/// Result of a module `describe` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub fields: Vec<ModuleFieldInfo>,
}

impl ModuleInfo {
    pub fn field(&self, name: &str) -> Option<&ModuleFieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Semantic type of a described field. A field the module does not
    /// describe cannot be mapped and is a configuration problem.
    pub fn field_type(&self, name: &str) -> Result<FieldType> {
        self.field(name)
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "Field '{}' is not described by module {}",
                    name, self.name
                ))
            })?
            .field_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VtigerUser {
    pub id: String,
    pub user_name: String,
}

/// Behavior shared by every CRM record type
pub trait BaseModel {
    fn object(&self) -> RemoteObject;
    fn data(&self) -> &FieldMap;
    fn data_mut(&mut self) -> &mut FieldMap;

    fn id(&self) -> Option<&str> {
        self.data().get(FIELD_ID).and_then(|v| v.as_str())
    }

    fn modified_time(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .data()
            .get(FIELD_MODIFIED_TIME)
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        parse_remote_datetime(raw)
    }

    fn assigned_user_id(&self) -> Option<&str> {
        self.data().get(FIELD_ASSIGNED_USER).and_then(|v| v.as_str())
    }

    fn set_assigned_user_id(&mut self, user_id: &str) {
        self.data_mut().insert(
            FIELD_ASSIGNED_USER.to_string(),
            serde_json::Value::String(user_id.to_string()),
        );
    }

    fn email(&self) -> serde_json::Value {
        self.data().get(FIELD_EMAIL).cloned().unwrap_or_default()
    }

    fn email_optout(&self) -> serde_json::Value {
        self.data()
            .get(FIELD_EMAIL_OPTOUT)
            .cloned()
            .unwrap_or_default()
    }

    /// Requested fields in request order; absent fields come back as null
    fn dehydrate(&self, fields: &[String]) -> Vec<(String, serde_json::Value)> {
        fields
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    self.data().get(name).cloned().unwrap_or_default(),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    data: FieldMap,
}

impl Contact {
    pub fn new(data: FieldMap) -> Self {
        Self { data }
    }

    pub fn is_converted_from_lead(&self) -> bool {
        match self.data.get(FIELD_CONVERTED_FROM_LEAD) {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "1",
            Some(serde_json::Value::Number(n)) => n.as_i64() == Some(1),
            _ => false,
        }
    }
}

impl BaseModel for Contact {
    fn object(&self) -> RemoteObject {
        RemoteObject::Contacts
    }

    fn data(&self) -> &FieldMap {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FieldMap {
        &mut self.data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    data: FieldMap,
}

impl Lead {
    pub fn new(data: FieldMap) -> Self {
        Self { data }
    }
}

impl BaseModel for Lead {
    fn object(&self) -> RemoteObject {
        RemoteObject::Leads
    }

    fn data(&self) -> &FieldMap {
        &self.data
    }

    fn data_mut(&mut self) -> &mut FieldMap {
        &mut self.data
    }
}

/// A CRM record of any supported type
#[derive(Debug, Clone, PartialEq)]
pub enum VtigerRecord {
    Contact(Contact),
    Lead(Lead),
}

impl VtigerRecord {
    pub fn model(&self) -> &dyn BaseModel {
        match self {
            VtigerRecord::Contact(c) => c,
            VtigerRecord::Lead(l) => l,
        }
    }

    pub fn model_mut(&mut self) -> &mut dyn BaseModel {
        match self {
            VtigerRecord::Contact(c) => c,
            VtigerRecord::Lead(l) => l,
        }
    }

    pub fn as_contact(&self) -> Option<&Contact> {
        match self {
            VtigerRecord::Contact(c) => Some(c),
            VtigerRecord::Lead(_) => None,
        }
    }
}

pub struct ModelFactory;

impl ModelFactory {
    pub fn create(object: RemoteObject, data: FieldMap) -> VtigerRecord {
        match object {
            RemoteObject::Contacts => VtigerRecord::Contact(Contact::new(data)),
            RemoteObject::Leads => VtigerRecord::Lead(Lead::new(data)),
        }
    }
}

pub fn parse_remote_datetime(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, REMOTE_DATETIME_FORMAT)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .map_err(|e| SyncError::InvalidValue {
            value: raw.to_string(),
            field_type: FieldType::DateTime.name().to_string(),
            reason: e.to_string(),
        })
}

pub fn format_remote_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(REMOTE_DATETIME_FORMAT).to_string()
}
