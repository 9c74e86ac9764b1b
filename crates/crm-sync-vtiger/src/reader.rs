//! Change Reader: pages through records modified after a watermark

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crm_sync_api::{RemoteObject, Result};

use crate::client::{with_timeout, RecordQuery, VtigerClient};
use crate::models::{ModelFactory, VtigerRecord};

pub struct ChangeReader {
    client: Arc<dyn VtigerClient>,
    page_size: usize,
    timeout: Duration,
}

impl ChangeReader {
    pub fn new(client: Arc<dyn VtigerClient>, page_size: usize, timeout: Duration) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
            timeout,
        }
    }

    /// All records of `object` modified strictly after `since`, in the order
    /// the CRM returns them.
    ///
    /// `id`, `modifiedtime` and `assigned_user_id` are always selected. Any
    /// failed or timed out page fails the whole read.
    #[tracing::instrument(name = "reader.read_changes", skip_all, fields(object = %object))]
    pub async fn read_changes(
        &self,
        object: RemoteObject,
        since: DateTime<Utc>,
        fields: &[String],
    ) -> Result<Vec<VtigerRecord>> {
        let mut query = RecordQuery::new(object, fields, since, self.page_size);
        let mut records = Vec::new();

        loop {
            debug!(vtql = %query.to_vtql(), "Querying changed records");
            let page = with_timeout(self.timeout, "query", self.client.query(&query)).await?;
            let page_len = page.len();
            records.extend(page.into_iter().map(|row| ModelFactory::create(object, row)));

            if page_len < self.page_size {
                break;
            }
            query = query.next_page();
        }

        debug!(count = records.len(), "Read changed records");
        Ok(records)
    }
}
