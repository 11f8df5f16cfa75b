//! YouTube Data API v3 client

use super::{UploadPage, UpstreamApi};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{ChannelId, ChannelInfo, ItemRecord, ItemRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Error reasons the API uses when the daily budget is spent
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"];

/// HTTP implementation of [`UpstreamApi`] against the YouTube Data API
///
/// The underlying `reqwest::Client` is built once and reused for every call,
/// with the configured per-call timeout applied to each request.
pub struct YouTubeClient {
    /// HTTP client (connection pool shared by all calls)
    http_client: reqwest::Client,
    /// Base URL without trailing slash
    base_url: String,
    /// API key sent as the `key` query parameter
    api_key: String,
}

impl YouTubeClient {
    /// Create a client from API settings
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the base URL is invalid, or a transport
    /// error if the HTTP client cannot be created.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        url::Url::parse(&config.base_url)
            .map_err(|e| Error::config("base_url", format!("invalid API base URL: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Issue a GET against `resource` and decode the JSON body
    async fn get<T: DeserializeOwned>(&self, resource: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, resource);
        debug!(%url, "upstream request");

        let response = self
            .http_client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl UpstreamApi for YouTubeClient {
    async fn search_channel(&self, name: &str) -> Result<Option<ChannelId>> {
        let response: SearchResponse = self
            .get(
                "search",
                &[
                    ("part", "id,snippet"),
                    ("type", "channel"),
                    ("maxResults", "5"),
                    ("q", name),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .find_map(|item| item.id.channel_id)
            .map(ChannelId::new))
    }

    async fn channel_info(&self, id: &ChannelId) -> Result<Option<ChannelInfo>> {
        let response: ListResponse<ChannelResource> = self
            .get(
                "channels",
                &[
                    ("part", "snippet,statistics,contentDetails"),
                    ("id", id.as_str()),
                ],
            )
            .await?;

        Ok(response.items.into_iter().next().map(|channel| ChannelInfo {
            id: ChannelId::new(channel.id),
            name: channel.snippet.title,
            uploads_index: channel.content_details.related_playlists.uploads,
            item_count: channel.statistics.video_count.as_deref().and_then(parse_count),
        }))
    }

    async fn upload_page(
        &self,
        uploads_index: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<UploadPage> {
        let max_results = page_size.to_string();
        let mut query = vec![
            ("part", "snippet,contentDetails"),
            ("playlistId", uploads_index),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(cursor) = cursor {
            query.push(("pageToken", cursor));
        }

        let response: ListResponse<PlaylistItemResource> =
            self.get("playlistItems", &query).await?;

        let items = response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item
                    .content_details
                    .video_id
                    .or(item.snippet.resource_id.video_id)?;
                // Publish time of the item itself, not when it joined the index
                let published_at = item
                    .content_details
                    .video_published_at
                    .or(item.snippet.published_at);
                match published_at {
                    Some(published_at) => Some(ItemRef { id, published_at }),
                    None => {
                        debug!(item = %id, "skipping upload without publish time");
                        None
                    }
                }
            })
            .collect();

        Ok(UploadPage {
            items,
            next_cursor: response.next_page_token,
        })
    }

    async fn fetch_items(&self, ids: &[String]) -> Result<Vec<ItemRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let response: ListResponse<VideoResource> = self
            .get(
                "videos",
                &[
                    ("part", "snippet,statistics,contentDetails"),
                    ("id", joined.as_str()),
                ],
            )
            .await?;

        Ok(response
            .items
            .into_iter()
            .map(|video| ItemRecord {
                id: video.id,
                title: video.snippet.title,
                description: video.snippet.description,
                channel_id: video.snippet.channel_id,
                channel_name: video.snippet.channel_title,
                published_at: video.snippet.published_at,
                view_count: video.statistics.count(|s| &s.view_count),
                like_count: video.statistics.count(|s| &s.like_count),
                comment_count: video.statistics.count(|s| &s.comment_count),
                duration: video.content_details.duration,
                thumbnail_url: video.snippet.thumbnails.medium.map(|t| t.url),
            })
            .collect())
    }
}

/// Map a non-success response onto the error taxonomy
fn classify_error(status: u16, body: &str) -> Error {
    let parsed = serde_json::from_str::<ErrorResponse>(body).ok();
    let message = parsed
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());

    let quota_exhausted = status == 403
        && parsed.is_some_and(|e| {
            e.error
                .errors
                .iter()
                .any(|detail| QUOTA_REASONS.contains(&detail.reason.as_str()))
        });

    if quota_exhausted {
        Error::UpstreamQuota(message)
    } else {
        Error::Api { status, message }
    }
}

/// Counters arrive as decimal strings
fn parse_count(raw: &str) -> Option<u64> {
    raw.parse().ok()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    id: String,
    snippet: ChannelSnippet,
    #[serde(default)]
    statistics: ChannelStatistics,
    #[serde(default)]
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    video_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    #[serde(default)]
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Default, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemResource {
    #[serde(default)]
    snippet: PlaylistItemSnippet,
    #[serde(default)]
    content_details: PlaylistItemContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    resource_id: ResourceId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemContentDetails {
    video_id: Option<String>,
    video_published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
    #[serde(default)]
    content_details: VideoContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    #[serde(default)]
    description: String,
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    published_at: DateTime<Utc>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

impl VideoStatistics {
    /// Missing or hidden counters count as zero
    fn count(&self, field: impl Fn(&Self) -> &Option<String>) -> u64 {
        field(self).as_deref().and_then(parse_count).unwrap_or(0)
    }
}

#[derive(Debug, Default, Deserialize)]
struct VideoContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    reason: String,
}
