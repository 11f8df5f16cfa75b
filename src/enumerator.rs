//! Lazy enumeration of a channel's upload index
//!
//! [`UploadEnumerator`] is pull-based: the caller asks for one [`ItemRef`] at a
//! time and may stop pulling at any point (for example when an item cap is
//! reached). Pages are only requested when the buffered page runs dry, so a
//! caller that stops early never pays for pages it does not consume.

use crate::api::UpstreamApi;
use crate::error::Result;
use crate::quota::QuotaTracker;
use crate::types::{EnumerationEnd, ItemRef};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Newest-first sequence of uploads for one channel
///
/// Finite and non-restartable. Each page request reserves `page_cost` units
/// before it is issued.
pub struct UploadEnumerator {
    api: Arc<dyn UpstreamApi>,
    quota: QuotaTracker,
    uploads_index: String,
    page_cost: u64,
    page_size: usize,
    page_delay: Duration,
    /// Items older than this end enumeration (None = unbounded)
    cutoff: Option<DateTime<Utc>>,
    /// Remaining items of the current page
    buffer: VecDeque<ItemRef>,
    /// Continuation token for the next page
    cursor: Option<String>,
    pages_fetched: usize,
    end: Option<EnumerationEnd>,
}

impl UploadEnumerator {
    /// Create an enumerator over `uploads_index`
    ///
    /// No request is made until the first call to [`next`](Self::next).
    pub fn new(
        api: Arc<dyn UpstreamApi>,
        quota: QuotaTracker,
        uploads_index: impl Into<String>,
        page_cost: u64,
    ) -> Self {
        Self {
            api,
            quota,
            uploads_index: uploads_index.into(),
            page_cost,
            page_size: crate::config::UPSTREAM_MAX_PAGE,
            page_delay: Duration::ZERO,
            cutoff: None,
            buffer: VecDeque::new(),
            cursor: None,
            pages_fetched: 0,
            end: None,
        }
    }

    /// Stop at the first item published before `cutoff`
    pub fn with_cutoff(mut self, cutoff: Option<DateTime<Utc>>) -> Self {
        self.cutoff = cutoff;
        self
    }

    /// Items requested per page, and the pause between page requests
    pub fn with_paging(mut self, page_size: usize, page_delay: Duration) -> Self {
        self.page_size = page_size.max(1);
        self.page_delay = page_delay;
        self
    }

    /// Next item, or `None` once enumeration has ended
    ///
    /// The cutoff is checked on each item as it is yielded. The first item
    /// older than the cutoff ends enumeration, even if later items on the same
    /// page are newer.
    ///
    /// # Errors
    ///
    /// [`Error::QuotaExceeded`](crate::Error::QuotaExceeded) if the next page
    /// cannot be paid for, or the upstream error of a failed page request.
    pub async fn next(&mut self) -> Result<Option<ItemRef>> {
        loop {
            if self.end.is_some() {
                return Ok(None);
            }

            if let Some(item) = self.buffer.pop_front() {
                if self.cutoff.is_some_and(|cutoff| item.published_at < cutoff) {
                    debug!(
                        index = %self.uploads_index,
                        item = %item.id,
                        published_at = %item.published_at,
                        "lookback cutoff reached"
                    );
                    self.finish(EnumerationEnd::CutoffReached);
                    return Ok(None);
                }
                return Ok(Some(item));
            }

            if self.pages_fetched > 0 && self.cursor.is_none() {
                self.finish(EnumerationEnd::Exhausted);
                return Ok(None);
            }

            self.fetch_page().await?;
        }
    }

    /// Stop enumerating because the caller's cap was reached
    pub fn stop_capped(&mut self) {
        self.finish(EnumerationEnd::Capped);
    }

    /// How enumeration ended, once it has
    pub fn end(&self) -> Option<EnumerationEnd> {
        self.end
    }

    /// Number of pages requested so far
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn finish(&mut self, end: EnumerationEnd) {
        self.buffer.clear();
        self.end = Some(end);
    }

    async fn fetch_page(&mut self) -> Result<()> {
        if self.pages_fetched > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        self.quota.reserve(self.page_cost)?;
        let page = self
            .api
            .upload_page(&self.uploads_index, self.cursor.as_deref(), self.page_size)
            .await?;

        self.pages_fetched += 1;
        debug!(
            index = %self.uploads_index,
            page = self.pages_fetched,
            items = page.items.len(),
            has_more = page.next_cursor.is_some(),
            "upload page fetched"
        );

        self.cursor = page.next_cursor;
        self.buffer.extend(page.items);
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::test_helpers::{ScriptedApi, channel_id, fixture_now};
    use chrono::Duration as ChronoDuration;

    fn enumerator(api: Arc<ScriptedApi>, quota: QuotaTracker, page_size: usize) -> UploadEnumerator {
        let index = format!("UU{}", &channel_id("chan").as_str()[2..]);
        UploadEnumerator::new(api, quota, index, 1).with_paging(page_size, Duration::ZERO)
    }

    async fn drain(enumerator: &mut UploadEnumerator) -> Vec<ItemRef> {
        let mut items = Vec::new();
        while let Some(item) = enumerator.next().await.unwrap() {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn yields_every_item_across_pages() {
        let api = Arc::new(ScriptedApi::new().with_channel("Chan", "chan", 7));
        let quota = QuotaTracker::new(100);
        let mut uploads = enumerator(api.clone(), quota.clone(), 3);

        let items = drain(&mut uploads).await;

        assert_eq!(items.len(), 7);
        assert_eq!(items[0].id, "chan-00000");
        assert_eq!(uploads.end(), Some(EnumerationEnd::Exhausted));
        assert_eq!(uploads.pages_fetched(), 3);
        assert_eq!(quota.used(), 3, "one unit per page");

        let cursors: Vec<_> = api.calls().pages.into_iter().map(|(_, c)| c).collect();
        assert_eq!(cursors, vec![None, Some("3".into()), Some("6".into())]);
    }

    #[tokio::test]
    async fn no_request_before_first_pull() {
        let api = Arc::new(ScriptedApi::new().with_channel("Chan", "chan", 7));
        let _uploads = enumerator(api.clone(), QuotaTracker::new(100), 3);
        assert!(api.calls().pages.is_empty());
    }

    #[tokio::test]
    async fn cutoff_stops_at_first_older_item() {
        let now = fixture_now();
        // Not strictly chronological: a newer item follows the first too-old one
        let dates = vec![
            now - ChronoDuration::days(1),
            now - ChronoDuration::days(2),
            now - ChronoDuration::days(40),
            now - ChronoDuration::days(3),
            now - ChronoDuration::days(50),
        ];
        let api = Arc::new(ScriptedApi::new().with_dated_channel("Chan", "chan", dates));
        let mut uploads = enumerator(api.clone(), QuotaTracker::new(100), 50)
            .with_cutoff(Some(now - ChronoDuration::days(30)));

        let items = drain(&mut uploads).await;

        let ids: Vec<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["chan-00000", "chan-00001"]);
        assert_eq!(uploads.end(), Some(EnumerationEnd::CutoffReached));
        assert_eq!(api.calls().pages.len(), 1);
    }

    #[tokio::test]
    async fn cutoff_on_page_boundary_skips_later_pages() {
        let now = fixture_now();
        let dates = (0..6)
            .map(|i| now - ChronoDuration::days(i * 10))
            .collect::<Vec<_>>();
        let api = Arc::new(ScriptedApi::new().with_dated_channel("Chan", "chan", dates));
        let mut uploads = enumerator(api.clone(), QuotaTracker::new(100), 2)
            .with_cutoff(Some(now - ChronoDuration::days(25)));

        let items = drain(&mut uploads).await;

        assert_eq!(items.len(), 3);
        assert_eq!(api.calls().pages.len(), 2, "page after the cutoff is never requested");
    }

    #[tokio::test]
    async fn stopping_early_requests_no_further_pages() {
        let api = Arc::new(ScriptedApi::new().with_channel("Chan", "chan", 10));
        let mut uploads = enumerator(api.clone(), QuotaTracker::new(100), 4);

        for _ in 0..4 {
            uploads.next().await.unwrap().unwrap();
        }
        uploads.stop_capped();

        assert_eq!(uploads.next().await.unwrap(), None);
        assert_eq!(uploads.end(), Some(EnumerationEnd::Capped));
        assert_eq!(api.calls().pages.len(), 1);
    }

    #[tokio::test]
    async fn page_is_refused_without_budget() {
        let api = Arc::new(ScriptedApi::new().with_channel("Chan", "chan", 10));
        let quota = QuotaTracker::new(1);
        let mut uploads = enumerator(api.clone(), quota.clone(), 5);

        for _ in 0..5 {
            uploads.next().await.unwrap().unwrap();
        }
        let err = uploads.next().await.unwrap_err();

        assert!(err.is_run_fatal());
        assert_eq!(api.calls().pages.len(), 1, "rejected page is never requested");
        assert_eq!(quota.used(), 1);
    }

    #[tokio::test]
    async fn empty_index_is_exhausted_after_one_page() {
        let api = Arc::new(ScriptedApi::new().with_channel("Chan", "chan", 0));
        let mut uploads = enumerator(api, QuotaTracker::new(100), 5);

        assert_eq!(uploads.next().await.unwrap(), None);
        assert_eq!(uploads.end(), Some(EnumerationEnd::Exhausted));
        assert_eq!(uploads.pages_fetched(), 1);
    }
}
