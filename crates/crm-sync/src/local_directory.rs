//! Lookup of host contact records by their distinguishing field

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crm_sync_api::Result;

/// Host-side contact lookup, implemented by the host application
#[async_trait]
pub trait LocalContactFinder: Send + Sync {
    /// Return the local id of the contact owning this email, if any
    async fn find_by_email(&self, email: &str) -> Result<Option<String>>;
}

/// In-memory contact directory keyed by lowercased email
#[derive(Debug, Default)]
pub struct MemoryContactDirectory {
    by_email: RwLock<HashMap<String, String>>,
}

impl MemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, email: &str, local_id: impl Into<String>) {
        self.by_email
            .write()
            .await
            .insert(email.trim().to_lowercase(), local_id.into());
    }
}

#[async_trait]
impl LocalContactFinder for MemoryContactDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<String>> {
        Ok(self
            .by_email
            .read()
            .await
            .get(&email.trim().to_lowercase())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_ignores_case() {
        let directory = MemoryContactDirectory::new();
        directory.insert("A@X.com", "42").await;
        assert_eq!(
            directory.find_by_email("a@x.com").await.unwrap(),
            Some("42".to_string())
        );
        assert_eq!(directory.find_by_email("b@x.com").await.unwrap(), None);
    }
}
