//! Error taxonomy for sync runs

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// Fatal for the whole run (e.g. missing default owner)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown field type '{field_type}'")]
    UnknownFieldType { field_type: String },

    #[error("Failed to normalize value '{value}' of type '{field_type}'. {reason}")]
    InvalidValue {
        value: String,
        field_type: String,
        reason: String,
    },

    #[error("Invalid {object} object, field '{field}': {reason}")]
    InvalidObject {
        object: String,
        field: String,
        reason: String,
    },

    #[error("Remote validation failed: {message}")]
    RemoteValidation { message: String },

    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("No mapping for {object} #{id}")]
    MappingNotFound { object: String, id: String },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SyncError::Configuration {
            message: message.into(),
        }
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        SyncError::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn remote_validation(message: impl Into<String>) -> Self {
        SyncError::RemoteValidation {
            message: message.into(),
        }
    }

    /// Errors scoped to a single record: the executor logs them and moves on
    /// to the next record. Everything else stops the batch.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidObject { .. }
                | SyncError::InvalidValue { .. }
                | SyncError::RemoteValidation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
