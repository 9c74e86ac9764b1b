//! Integration settings
//!
//! Read once from the host's plugin configuration (a JSON document) and
//! handed to the exchanges through [`SettingProvider`].

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crm_sync_api::SyncError;

pub const DEFAULT_INTEGRATION_NAME: &str = "VtigerCrm";
pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings the exchanges read at runtime
pub trait SettingProvider: Send + Sync {
    fn integration_name(&self) -> &str;
    fn should_push_contacts_as_contacts(&self) -> bool;
    /// Force the configured owner onto updated records
    fn should_update_owner(&self) -> bool;
    /// Owner assigned to created records
    fn owner(&self) -> Option<&str>;
    fn request_timeout(&self) -> Duration;
    fn query_limit(&self) -> usize;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VtigerSettings {
    pub integration_name: String,
    pub push_contacts_as_contacts: bool,
    pub update_owner: bool,
    pub owner: Option<String>,
    pub request_timeout_secs: u64,
    pub query_limit: usize,
}

impl Default for VtigerSettings {
    fn default() -> Self {
        Self {
            integration_name: DEFAULT_INTEGRATION_NAME.to_string(),
            push_contacts_as_contacts: true,
            update_owner: false,
            owner: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            query_limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl VtigerSettings {
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let settings: Self =
            serde_json::from_str(json).context("Failed to parse Vtiger settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.query_limit == 0 {
            return Err(SyncError::configuration("query_limit must be at least 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::configuration(
                "request_timeout_secs must be at least 1",
            ));
        }
        if self.integration_name.trim().is_empty() {
            return Err(SyncError::configuration("integration_name must not be empty"));
        }
        Ok(())
    }
}

impl SettingProvider for VtigerSettings {
    fn integration_name(&self) -> &str {
        &self.integration_name
    }

    fn should_push_contacts_as_contacts(&self) -> bool {
        self.push_contacts_as_contacts
    }

    fn should_update_owner(&self) -> bool {
        self.update_owner
    }

    fn owner(&self) -> Option<&str> {
        // The settings form stores an unset owner as an empty string
        self.owner.as_deref().filter(|o| !o.trim().is_empty())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn query_limit(&self) -> usize {
        self.query_limit
    }
}
