//! Mock upstream API for HTTP-level pipeline tests
//!
//! Serves channel lookups, paginated upload indexes and batched item
//! metadata from an in-memory catalog, shaped like the real Data API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Newest upload of every mock channel
pub fn newest_upload() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap()
}

/// A channel served by [`MockUpstream`]
#[derive(Clone, Debug)]
pub struct MockChannel {
    /// Stable identifier (24 characters, `UC` prefix)
    pub id: String,
    /// Display name
    pub title: String,
    /// Handle the search endpoint answers to
    pub handle: String,
    /// Uploads newest first
    pub uploads: Vec<(String, DateTime<Utc>)>,
}

impl MockChannel {
    /// Channel with `count` daily uploads, newest at [`newest_upload`]
    pub fn daily(title: &str, count: usize) -> Self {
        let tag: String = title
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_lowercase();
        let id = format!("UC{tag:x<22}");
        let uploads = (0..count)
            .map(|i| {
                (
                    format!("{tag}-{i:05}"),
                    newest_upload() - Duration::days(i as i64),
                )
            })
            .collect();
        Self {
            id,
            title: title.to_string(),
            handle: tag,
            uploads,
        }
    }

    /// Upload index identifier
    pub fn uploads_index(&self) -> String {
        format!("UU{}", &self.id[2..])
    }

    fn item_json(&self, id: &str, published_at: DateTime<Utc>) -> Value {
        json!({
            "id": id,
            "snippet": {
                "title": format!("{} upload {id}", self.title),
                "description": "x".repeat(1200),
                "channelId": self.id,
                "channelTitle": self.title,
                "publishedAt": published_at.to_rfc3339(),
                "thumbnails": {"medium": {"url": format!("https://img.test/{id}.jpg")}}
            },
            "statistics": {"viewCount": "100", "likeCount": "7", "commentCount": "2"},
            "contentDetails": {"duration": "PT4M13S"}
        })
    }
}

/// In-memory catalog mounted on a wiremock server
pub struct MockUpstream {
    channels: Vec<MockChannel>,
    page_size: usize,
}

impl MockUpstream {
    /// Catalog serving pages of `page_size` uploads
    pub fn new(page_size: usize) -> Self {
        Self {
            channels: Vec::new(),
            page_size,
        }
    }

    /// Add a channel to the catalog
    pub fn with_channel(mut self, channel: MockChannel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Mount every endpoint on `server`
    pub async fn mount(self, server: &MockServer) {
        for channel in &self.channels {
            Mock::given(method("GET"))
                .and(path("/search"))
                .and(query_param("q", channel.handle.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "items": [{"id": {"kind": "youtube#channel", "channelId": channel.id}}]
                })))
                .mount(server)
                .await;

            Mock::given(method("GET"))
                .and(path("/channels"))
                .and(query_param("id", channel.id.as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "items": [{
                        "id": channel.id,
                        "snippet": {"title": channel.title},
                        "statistics": {"videoCount": channel.uploads.len().to_string()},
                        "contentDetails": {"relatedPlaylists": {"uploads": channel.uploads_index()}}
                    }]
                })))
                .mount(server)
                .await;

            let pages: Vec<_> = channel.uploads.chunks(self.page_size.max(1)).collect();
            for (number, page) in pages.iter().enumerate() {
                let items: Vec<Value> = page
                    .iter()
                    .map(|(id, published_at)| {
                        json!({
                            "snippet": {"resourceId": {"videoId": id}},
                            "contentDetails": {
                                "videoId": id,
                                "videoPublishedAt": published_at.to_rfc3339()
                            }
                        })
                    })
                    .collect();
                let mut body = json!({ "items": items });
                if number + 1 < pages.len() {
                    body["nextPageToken"] = json!(format!("page-{}", number + 1));
                }

                let mut mock = Mock::given(method("GET"))
                    .and(path("/playlistItems"))
                    .and(query_param("playlistId", channel.uploads_index()));
                if number > 0 {
                    mock = mock.and(query_param("pageToken", format!("page-{number}")));
                }
                // Token matches outrank the untokened first page
                mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
                    .with_priority(if number == 0 { 10 } else { 1 })
                    .mount(server)
                    .await;
            }
        }

        let channels = self.channels;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .respond_with(move |request: &Request| {
                let ids = request
                    .url
                    .query_pairs()
                    .find(|(key, _)| key == "id")
                    .map(|(_, value)| value.into_owned())
                    .unwrap_or_default();
                let items: Vec<Value> = ids
                    .split(',')
                    .filter_map(|id| {
                        channels.iter().find_map(|channel| {
                            channel
                                .uploads
                                .iter()
                                .find(|(upload, _)| upload == id)
                                .map(|(upload, published_at)| {
                                    channel.item_json(upload, *published_at)
                                })
                        })
                    })
                    .collect();
                ResponseTemplate::new(200).set_body_json(json!({ "items": items }))
            })
            .mount(server)
            .await;
    }
}

/// Make every request to `endpoint` fail with the daily-quota error
pub async fn mount_quota_exceeded(server: &MockServer, endpoint: &str) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [{"reason": "quotaExceeded", "domain": "youtube.quota"}]
            }
        })))
        .with_priority(1)
        .mount(server)
        .await;
}
