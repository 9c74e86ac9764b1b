use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SyncError};

/// Semantic type of a CRM field as reported by the module description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Text,
    Phone,
    Picklist,
    Email,
    Boolean,
    Date,
    DateTime,
    Reference,
    Owner,
    Autogenerated,
    /// Host-internal do-not-contact flag, never reported by the CRM
    DoNotContact,
}

impl FieldType {
    /// Resolve a type name from a module description.
    ///
    /// Unrecognized names are an error: passing them through would silently
    /// drop the field's semantics.
    pub fn from_name(name: &str) -> Result<Self> {
        let field_type = match name {
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "phone" => FieldType::Phone,
            "picklist" => FieldType::Picklist,
            "email" => FieldType::Email,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "reference" => FieldType::Reference,
            "owner" => FieldType::Owner,
            "autogenerated" => FieldType::Autogenerated,
            "dnc" => FieldType::DoNotContact,
            other => {
                return Err(SyncError::UnknownFieldType {
                    field_type: other.to_string(),
                })
            }
        };
        Ok(field_type)
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Phone => "phone",
            FieldType::Picklist => "picklist",
            FieldType::Email => "email",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Reference => "reference",
            FieldType::Owner => "owner",
            FieldType::Autogenerated => "autogenerated",
            FieldType::DoNotContact => "dnc",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
