//! Batched metadata fetching

use crate::api::UpstreamApi;
use crate::config::UPSTREAM_MAX_PAGE;
use crate::error::Result;
use crate::quota::QuotaTracker;
use crate::types::{ItemRecord, ItemRef};
use crate::utils::truncate_chars;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Turns [`ItemRef`]s into full [`ItemRecord`]s, one upstream call per group
///
/// Every call reserves `batch_cost` units before it is issued, regardless of
/// how many identifiers the group holds.
pub struct BatchFetcher {
    api: Arc<dyn UpstreamApi>,
    quota: QuotaTracker,
    batch_cost: u64,
    /// Maximum description length in characters (None = keep everything)
    description_limit: Option<usize>,
}

impl BatchFetcher {
    /// Create a fetcher that spends budget from `quota`
    pub fn new(
        api: Arc<dyn UpstreamApi>,
        quota: QuotaTracker,
        batch_cost: u64,
        description_limit: Option<usize>,
    ) -> Self {
        Self {
            api,
            quota,
            batch_cost,
            description_limit,
        }
    }

    /// Fetch metadata for `refs` in groups of at most `max_batch`
    ///
    /// Records come back in the order of `refs`. Identifiers the upstream
    /// service does not return (deleted or private items) are dropped.
    /// `max_batch` is further limited to what the upstream accepts per call.
    ///
    /// # Errors
    ///
    /// [`Error::QuotaExceeded`](crate::Error::QuotaExceeded) if a group cannot
    /// be paid for (checked before the call is issued), or the upstream error
    /// of a failed call.
    pub async fn fetch(&self, refs: &[ItemRef], max_batch: usize) -> Result<Vec<ItemRecord>> {
        let group_size = max_batch.clamp(1, UPSTREAM_MAX_PAGE);
        let mut records = Vec::with_capacity(refs.len());

        for group in refs.chunks(group_size) {
            self.quota.reserve(self.batch_cost)?;

            let ids: Vec<String> = group.iter().map(|r| r.id.clone()).collect();
            let fetched = self.api.fetch_items(&ids).await?;

            let mut by_id: HashMap<String, ItemRecord> = fetched
                .into_iter()
                .map(|record| (record.id.clone(), record))
                .collect();

            let before = records.len();
            records.extend(ids.iter().filter_map(|id| by_id.remove(id)).map(|mut record| {
                if let Some(limit) = self.description_limit {
                    record.description = truncate_chars(&record.description, limit);
                }
                record
            }));

            let returned = records.len() - before;
            if returned < ids.len() {
                debug!(
                    requested = ids.len(),
                    returned,
                    "upstream omitted some items"
                );
            }
        }

        Ok(records)
    }
}
