//! Upstream metadata API
//!
//! The ingestion pipeline only talks to the upstream service through the
//! [`UpstreamApi`] trait, so the HTTP client can be swapped for a scripted
//! implementation in tests. Implementations never touch the quota budget;
//! callers reserve the cost of a call before issuing it.

use crate::error::Result;
use crate::types::{ChannelId, ChannelInfo, ItemRecord, ItemRef};
use async_trait::async_trait;

mod youtube;

pub use youtube::YouTubeClient;

/// One page of a channel's upload index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPage {
    /// Items on this page, newest first
    pub items: Vec<ItemRef>,
    /// Cursor for the next page (None = index exhausted)
    pub next_cursor: Option<String>,
}

/// Calls the ingestion pipeline makes against the upstream service
///
/// # Examples
///
/// ```no_run
/// use channel_ingest::api::{UpstreamApi, YouTubeClient};
/// use channel_ingest::config::ApiConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = YouTubeClient::new(&ApiConfig {
///     api_key: "my-key".into(),
///     ..ApiConfig::default()
/// })?;
///
/// if let Some(id) = client.search_channel("rustlang").await? {
///     let info = client.channel_info(&id).await?;
///     println!("{info:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Look up a channel by free-text name; returns the first match
    async fn search_channel(&self, name: &str) -> Result<Option<ChannelId>>;

    /// Fetch channel metadata (name, upload index, item count)
    async fn channel_info(&self, id: &ChannelId) -> Result<Option<ChannelInfo>>;

    /// Fetch one page of an upload index
    ///
    /// # Arguments
    ///
    /// * `uploads_index` - Upload index identifier from [`ChannelInfo`]
    /// * `cursor` - Continuation token from the previous page (None = first page)
    /// * `page_size` - Maximum items on the page
    async fn upload_page(
        &self,
        uploads_index: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<UploadPage>;

    /// Fetch full metadata for a group of item identifiers
    ///
    /// Identifiers unknown upstream (deleted, private) are simply absent from
    /// the result. Order of the result is unspecified.
    async fn fetch_items(&self, ids: &[String]) -> Result<Vec<ItemRecord>>;
}
