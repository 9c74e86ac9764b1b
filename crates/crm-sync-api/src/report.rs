//! Report and order payloads exchanged with the host

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FieldType, Reclassification, RemoteObject, Value};

/// Synthesized field mirroring the email opt-out flag
pub const DNC_EMAIL_FIELD: &str = "mautic_internal_dnc_email";
/// Synthesized field mirroring the opt-out flag for SMS
pub const DNC_SMS_FIELD: &str = "mautic_internal_dnc_sms";

/// A value together with the type it was normalized as and its raw form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub field_type: FieldType,
    pub original: serde_json::Value,
    pub normalized: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedField {
    pub name: String,
    pub value: NormalizedValue,
}

impl NormalizedField {
    pub fn new(name: impl Into<String>, value: NormalizedValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One CRM record's worth of normalized fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectChange {
    pub object: RemoteObject,
    pub remote_id: String,
    pub modified_time: DateTime<Utc>,
    pub fields: Vec<NormalizedField>,
}

impl ObjectChange {
    pub fn new(object: RemoteObject, remote_id: impl Into<String>, modified_time: DateTime<Utc>) -> Self {
        Self {
            object,
            remote_id: remote_id.into(),
            modified_time,
            fields: Vec::new(),
        }
    }

    pub fn add_field(&mut self, field: NormalizedField) {
        self.fields.push(field);
    }

    pub fn field(&self, name: &str) -> Option<&NormalizedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Completed report of one sync pass, in the order records were read
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub objects: Vec<ObjectChange>,
    pub reclassified: Vec<Reclassification>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.reclassified.is_empty()
    }

    pub fn object(&self, object: RemoteObject, remote_id: &str) -> Option<&ObjectChange> {
        self.objects
            .iter()
            .find(|o| o.object == object && o.remote_id == remote_id)
    }

    /// Append another object's report (used when several CRM objects are
    /// requested in one pass)
    pub fn extend(&mut self, other: SyncReport) {
        self.objects.extend(other.objects);
        self.reclassified.extend(other.reclassified);
    }
}

/// A host-side change to push to the CRM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderChange {
    pub integration: String,
    pub remote_object: RemoteObject,
    /// Set on updates; filled in by the executor after a create
    pub remote_id: Option<String>,
    pub local_object: String,
    pub local_id: String,
    pub fields: Vec<(String, Value)>,
}
