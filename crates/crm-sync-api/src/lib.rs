use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod field;
pub mod mapping;
pub mod report;

pub use error::{Result, SyncError};
pub use field::FieldType;
pub use mapping::{IdentityMapping, MappingKey, Reclassification, UpdatedObjectMapping};
pub use report::{
    NormalizedField, NormalizedValue, ObjectChange, OrderChange, SyncReport, DNC_EMAIL_FIELD,
    DNC_SMS_FIELD,
};

/// Internal object name used by the host for its contact records
pub const LOCAL_CONTACT_OBJECT: &str = "lead";

/// Value in the host's canonical representation
///
/// Values coming from the CRM are converted into this type by the field
/// normalizer before they appear in a report.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Boolean(bool),
    // Stored as RFC3339 string
    DateTime(String),
    Reference(String),
    Null,
}

impl Value {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Get datetime value as parsed chrono::DateTime
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Value::DateTime(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            _ => None,
        }
    }

    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Value::DateTime(dt.to_rfc3339())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Object types known on the CRM side
///
/// Closed set: every exchange, model constructor and query matches on it
/// exhaustively instead of dispatching on module name strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RemoteObject {
    Contacts,
    Leads,
}

impl RemoteObject {
    /// Module name as used in CRM queries
    pub fn module_name(&self) -> &'static str {
        match self {
            RemoteObject::Contacts => "Contacts",
            RemoteObject::Leads => "Leads",
        }
    }

    pub fn from_module_name(name: &str) -> Option<Self> {
        match name {
            "Contacts" => Some(RemoteObject::Contacts),
            "Leads" => Some(RemoteObject::Leads),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.module_name())
    }
}
