//! Inbound CRM interface
//!
//! HTTP transport and authentication live outside this crate; anything that
//! can answer these calls (a webservice client, the fake in `fake`) plugs in
//! through [`VtigerClient`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use crm_sync_api::{RemoteObject, Result, SyncError};

use crate::models::{
    format_remote_datetime, FieldMap, ModuleInfo, VtigerRecord, VtigerUser, FIELD_ASSIGNED_USER,
    FIELD_ID, FIELD_MODIFIED_TIME,
};

/// Paged "changed since" query against one module
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub object: RemoteObject,
    pub fields: Vec<String>,
    pub modified_after: DateTime<Utc>,
    pub offset: usize,
    pub limit: usize,
}

impl RecordQuery {
    /// Build a query; `id`, `modifiedtime` and `assigned_user_id` are always
    /// selected, duplicates are dropped and order is kept
    pub fn new(
        object: RemoteObject,
        requested: &[String],
        modified_after: DateTime<Utc>,
        limit: usize,
    ) -> Self {
        let mut fields: Vec<String> = Vec::with_capacity(requested.len() + 3);
        for name in [FIELD_ID, FIELD_MODIFIED_TIME, FIELD_ASSIGNED_USER]
            .into_iter()
            .chain(requested.iter().map(String::as_str))
        {
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        }
        Self {
            object,
            fields,
            modified_after,
            offset: 0,
            limit,
        }
    }

    pub fn next_page(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            ..self.clone()
        }
    }

    /// Render as a VTQL statement for webservice transports.
    ///
    /// Rows are ordered by modification time then id so consecutive pages
    /// neither skip nor repeat rows.
    pub fn to_vtql(&self) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} > '{}' ORDER BY {}, {} LIMIT {}, {};",
            self.fields.join(","),
            self.object.module_name(),
            FIELD_MODIFIED_TIME,
            format_remote_datetime(&self.modified_after),
            FIELD_MODIFIED_TIME,
            FIELD_ID,
            self.offset,
            self.limit
        )
    }
}

#[async_trait]
pub trait VtigerClient: Send + Sync {
    /// Field descriptions of a module
    async fn describe(&self, object: RemoteObject) -> Result<ModuleInfo>;

    /// Rows matching the query, ordered by modification time then id; fails
    /// with `SourceUnavailable` if the query cannot be executed
    async fn query(&self, query: &RecordQuery) -> Result<Vec<FieldMap>>;

    /// Create the record; returns it as stored (with id and modified time).
    /// Rejected records fail with `RemoteValidation`.
    async fn create(&self, record: &VtigerRecord) -> Result<VtigerRecord>;

    async fn update(&self, record: &VtigerRecord) -> Result<VtigerRecord>;

    async fn list_users(&self) -> Result<Vec<VtigerUser>>;
}

/// Bound a single CRM call by the caller's timeout
pub async fn with_timeout<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::source_unavailable(format!(
            "{} timed out after {}s",
            operation,
            timeout.as_secs_f32()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn since() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_query_always_selects_identity_fields() {
        let query = RecordQuery::new(
            RemoteObject::Contacts,
            &["email".to_string(), "id".to_string()],
            since(),
            100,
        );
        assert_eq!(query.fields, vec!["id", "modifiedtime", "assigned_user_id", "email"]);
    }

    #[test]
    fn test_to_vtql() {
        let query = RecordQuery::new(RemoteObject::Leads, &["email".to_string()], since(), 100)
            .next_page();
        assert_eq!(
            query.to_vtql(),
            "SELECT id,modifiedtime,assigned_user_id,email FROM Leads WHERE modifiedtime > '2024-01-01 00:00:00' ORDER BY modifiedtime, id LIMIT 100, 100;"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_to_source_unavailable() {
        let result: Result<()> = with_timeout(Duration::from_secs(1), "query", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SyncError::SourceUnavailable { .. })));
    }
}
