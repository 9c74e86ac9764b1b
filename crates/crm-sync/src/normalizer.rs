//! Field normalization between the CRM's wire values and host values
//!
//! Normalization is pure: the same (type, value) input always produces the
//! same output, and nothing outside the returned value is touched.

use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use crm_sync_api::{FieldType, NormalizedValue, Result, SyncError, Value};

/// Date-time format used by the CRM on the wire (UTC)
pub const REMOTE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const REMOTE_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Default)]
pub struct ValueNormalizer;

impl ValueNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a field whose type is given by name, as found in a module
    /// description
    pub fn normalize_named(&self, type_name: &str, raw: &serde_json::Value) -> Result<NormalizedValue> {
        let field_type = FieldType::from_name(type_name)?;
        self.normalize_for_local(field_type, raw)
    }

    /// Convert a raw CRM value into the host representation
    pub fn normalize_for_local(
        &self,
        field_type: FieldType,
        raw: &serde_json::Value,
    ) -> Result<NormalizedValue> {
        let normalized = match field_type {
            FieldType::String
            | FieldType::Text
            | FieldType::Phone
            | FieldType::Picklist
            | FieldType::Autogenerated => match raw_to_string(field_type, raw)? {
                Some(s) => Value::String(s),
                None => Value::Null,
            },
            FieldType::Email => match non_empty(raw_to_string(field_type, raw)?) {
                Some(s) => {
                    let email = s.trim().to_string();
                    if let Err(reason) = check_email(&email) {
                        return Err(invalid_value(&s, field_type, reason));
                    }
                    Value::String(email)
                }
                None => Value::Null,
            },
            FieldType::Boolean | FieldType::DoNotContact => {
                Value::Boolean(parse_bool(field_type, raw)?)
            }
            FieldType::Reference | FieldType::Owner => {
                match non_empty(raw_to_string(field_type, raw)?) {
                    Some(s) => Value::Reference(s),
                    None => Value::Null,
                }
            }
            FieldType::Date => match non_empty(raw_to_string(field_type, raw)?) {
                Some(s) => {
                    let date = NaiveDate::parse_from_str(&s, REMOTE_DATE_FORMAT)
                        .map_err(|e| invalid_value(&s, field_type, &e.to_string()))?;
                    let midnight = date
                        .and_hms_opt(0, 0, 0)
                        .ok_or_else(|| invalid_value(&s, field_type, "Date out of range"))?;
                    Value::from_datetime(Utc.from_utc_datetime(&midnight))
                }
                None => Value::Null,
            },
            FieldType::DateTime => match non_empty(raw_to_string(field_type, raw)?) {
                Some(s) => {
                    let dt = NaiveDateTime::parse_from_str(&s, REMOTE_DATETIME_FORMAT)
                        .map_err(|e| invalid_value(&s, field_type, &e.to_string()))?;
                    Value::from_datetime(Utc.from_utc_datetime(&dt))
                }
                None => Value::Null,
            },
        };

        Ok(NormalizedValue {
            field_type,
            original: raw.clone(),
            normalized,
        })
    }

    /// Convert a host value back into the CRM wire representation
    pub fn normalize_for_remote(&self, field_type: FieldType, value: &Value) -> Result<serde_json::Value> {
        let wire = match (field_type, value) {
            (_, Value::Null) => String::new(),
            (FieldType::Boolean | FieldType::DoNotContact, Value::Integer(i)) => {
                bool_wire(*i != 0).to_string()
            }
            (FieldType::Date, Value::DateTime(_)) => value
                .as_datetime()
                .map(|dt| dt.format(REMOTE_DATE_FORMAT).to_string())
                .ok_or_else(|| invalid_value(&format!("{:?}", value), field_type, "Not a date"))?,
            (FieldType::DateTime, Value::DateTime(_)) => value
                .as_datetime()
                .map(|dt| dt.format(REMOTE_DATETIME_FORMAT).to_string())
                .ok_or_else(|| {
                    invalid_value(&format!("{:?}", value), field_type, "Not a date-time")
                })?,
            (_, Value::String(s)) | (_, Value::Reference(s)) | (_, Value::DateTime(s)) => s.clone(),
            (_, Value::Integer(i)) => i.to_string(),
            (_, Value::Boolean(b)) => bool_wire(*b).to_string(),
        };
        Ok(serde_json::Value::String(wire))
    }
}

/// Check the shape of an email address: one `@`, a non-empty local part and
/// a dotted domain, no whitespace.
pub fn check_email(email: &str) -> std::result::Result<(), &'static str> {
    if email.chars().any(char::is_whitespace) {
        return Err("Email must not contain whitespace");
    }
    let (local, domain) = email.split_once('@').ok_or("Missing '@'")?;
    if local.is_empty() {
        return Err("Empty local part");
    }
    if domain.contains('@') {
        return Err("More than one '@'");
    }
    if !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err("Invalid domain");
    }
    Ok(())
}

fn invalid_value(value: &str, field_type: FieldType, reason: &str) -> SyncError {
    SyncError::InvalidValue {
        value: value.to_string(),
        field_type: field_type.name().to_string(),
        reason: reason.to_string(),
    }
}

fn raw_to_string(field_type: FieldType, raw: &serde_json::Value) -> Result<Option<String>> {
    match raw {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        serde_json::Value::Bool(b) => Ok(Some(bool_wire(*b).to_string())),
        other => Err(invalid_value(
            &other.to_string(),
            field_type,
            "Structured values are not supported",
        )),
    }
}

fn bool_wire(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

fn parse_bool(field_type: FieldType, raw: &serde_json::Value) -> Result<bool> {
    match raw {
        serde_json::Value::Null => Ok(false),
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" | "off" | "no" => Ok(false),
            "1" | "true" | "on" | "yes" => Ok(true),
            _ => Err(invalid_value(s, field_type, "Not a boolean")),
        },
        other => Err(invalid_value(&other.to_string(), field_type, "Not a boolean")),
    }
}
