//! Shared test fixtures: a scripted upstream API and ingestor builders

use crate::api::{UploadPage, UpstreamApi};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingestor::ChannelIngestor;
use crate::types::{ChannelId, ChannelInfo, ItemRecord, ItemRef};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

/// Reference "now" for fixtures; the newest upload of every channel is one hour older
pub(crate) fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Build a 24-character channel identifier from a short tag
pub(crate) fn channel_id(tag: &str) -> ChannelId {
    let mut id = format!("UC{tag}");
    while id.len() < 24 {
        id.push('x');
    }
    id.truncate(24);
    ChannelId::new(id)
}

/// Every upstream call the scripted API has served
#[derive(Debug, Default, Clone)]
pub(crate) struct CallLog {
    pub searches: Vec<String>,
    pub lookups: Vec<ChannelId>,
    /// (uploads index, cursor) per page request
    pub pages: Vec<(String, Option<String>)>,
    /// Identifiers requested per metadata call
    pub batches: Vec<Vec<String>>,
}

struct ScriptedChannel {
    info: ChannelInfo,
    /// Newest first
    uploads: Vec<ItemRef>,
}

/// In-memory [`UpstreamApi`] that serves scripted channels and records calls
#[derive(Default)]
pub(crate) struct ScriptedApi {
    names: Mutex<HashMap<String, ChannelId>>,
    channels: Mutex<HashMap<ChannelId, ScriptedChannel>>,
    hidden_items: Mutex<HashSet<String>>,
    failing_channels: Mutex<HashSet<String>>,
    upstream_quota_spent: Mutex<bool>,
    log: Mutex<CallLog>,
}

impl ScriptedApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a channel with `count` uploads, one per day, newest an hour before [`fixture_now`]
    pub(crate) fn with_channel(self, name: &str, tag: &str, count: usize) -> Self {
        let newest = fixture_now() - Duration::hours(1);
        let dates = (0..count).map(|i| newest - Duration::days(i as i64)).collect();
        self.with_dated_channel(name, tag, dates)
    }

    /// Add a channel whose uploads carry the given publish times (index order)
    pub(crate) fn with_dated_channel(
        self,
        name: &str,
        tag: &str,
        dates: Vec<DateTime<Utc>>,
    ) -> Self {
        let id = channel_id(tag);
        let uploads = dates
            .into_iter()
            .enumerate()
            .map(|(i, published_at)| ItemRef {
                id: format!("{tag}-{i:05}"),
                published_at,
            })
            .collect::<Vec<_>>();

        let channel = ScriptedChannel {
            info: ChannelInfo {
                id: id.clone(),
                name: name.to_string(),
                uploads_index: Some(format!("UU{}", &id.as_str()[2..])),
                item_count: Some(uploads.len() as u64),
            },
            uploads,
        };

        self.names
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), id.clone());
        self.channels.lock().unwrap().insert(id, channel);
        self
    }

    /// Add a channel that exists but has no upload index
    pub(crate) fn with_indexless_channel(self, name: &str, tag: &str) -> Self {
        let id = channel_id(tag);
        self.names
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), id.clone());
        self.channels.lock().unwrap().insert(
            id.clone(),
            ScriptedChannel {
                info: ChannelInfo {
                    id,
                    name: name.to_string(),
                    uploads_index: None,
                    item_count: Some(0),
                },
                uploads: Vec::new(),
            },
        );
        self
    }

    /// Leave `item_id` out of metadata responses (deleted or private upstream)
    pub(crate) fn hide_item(self, item_id: &str) -> Self {
        self.hidden_items
            .lock()
            .unwrap()
            .insert(item_id.to_string());
        self
    }

    /// Make metadata calls for a channel's items fail with an HTTP 500
    pub(crate) fn fail_fetches_for(self, tag: &str) -> Self {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(format!("{tag}-"));
        self
    }

    /// Answer every call after this with an upstream quota error
    pub(crate) fn exhaust_upstream_quota(&self) {
        *self.upstream_quota_spent.lock().unwrap() = true;
    }

    pub(crate) fn calls(&self) -> CallLog {
        self.log.lock().unwrap().clone()
    }

    fn check_upstream_quota(&self) -> Result<()> {
        if *self.upstream_quota_spent.lock().unwrap() {
            return Err(Error::UpstreamQuota("quotaExceeded".into()));
        }
        Ok(())
    }

    fn record_for(channel: &ScriptedChannel, item: &ItemRef) -> ItemRecord {
        ItemRecord {
            id: item.id.clone(),
            title: format!("Item {}", item.id),
            description: "d".repeat(800),
            channel_id: channel.info.id.to_string(),
            channel_name: channel.info.name.clone(),
            published_at: item.published_at,
            view_count: 100,
            like_count: 10,
            comment_count: 1,
            duration: Some("PT1M".into()),
            thumbnail_url: None,
        }
    }
}

#[async_trait]
impl UpstreamApi for ScriptedApi {
    async fn search_channel(&self, name: &str) -> Result<Option<ChannelId>> {
        self.check_upstream_quota()?;
        self.log.lock().unwrap().searches.push(name.to_string());
        Ok(self.names.lock().unwrap().get(&name.to_lowercase()).cloned())
    }

    async fn channel_info(&self, id: &ChannelId) -> Result<Option<ChannelInfo>> {
        self.check_upstream_quota()?;
        self.log.lock().unwrap().lookups.push(id.clone());
        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(id)
            .map(|channel| channel.info.clone()))
    }

    async fn upload_page(
        &self,
        uploads_index: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<UploadPage> {
        self.check_upstream_quota()?;
        self.log
            .lock()
            .unwrap()
            .pages
            .push((uploads_index.to_string(), cursor.map(str::to_string)));

        let channels = self.channels.lock().unwrap();
        let channel = channels
            .values()
            .find(|c| c.info.uploads_index.as_deref() == Some(uploads_index))
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("unknown upload index {uploads_index}"),
            })?;

        let offset: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
        let end = (offset + page_size).min(channel.uploads.len());
        let items = channel.uploads[offset..end].to_vec();
        let next_cursor = (end < channel.uploads.len()).then(|| end.to_string());

        Ok(UploadPage { items, next_cursor })
    }

    async fn fetch_items(&self, ids: &[String]) -> Result<Vec<ItemRecord>> {
        self.check_upstream_quota()?;
        self.log.lock().unwrap().batches.push(ids.to_vec());

        let failing = self.failing_channels.lock().unwrap();
        if ids
            .iter()
            .any(|id| failing.iter().any(|prefix| id.starts_with(prefix.as_str())))
        {
            return Err(Error::Api {
                status: 500,
                message: "backend error".into(),
            });
        }

        let hidden = self.hidden_items.lock().unwrap();
        let channels = self.channels.lock().unwrap();
        let mut records: Vec<ItemRecord> = channels
            .values()
            .flat_map(|channel| {
                channel
                    .uploads
                    .iter()
                    .filter(|item| ids.contains(&item.id) && !hidden.contains(&item.id))
                    .map(|item| Self::record_for(channel, item))
                    .collect::<Vec<_>>()
            })
            .collect();

        // Upstream makes no ordering promise
        records.reverse();
        Ok(records)
    }
}

/// Config for tests: local data dir, no page pacing, generous quota
pub(crate) fn test_config(data_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.api.page_delay = StdDuration::ZERO;
    config.quota.daily_limit = 10_000;
    config.quota.usable_fraction = 1.0;
    config
}

/// Ingestor backed by `api`, storing under a fresh temp dir
pub(crate) async fn create_test_ingestor(
    api: Arc<ScriptedApi>,
    configure: impl FnOnce(&mut Config),
) -> (ChannelIngestor, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);
    let ingestor = ChannelIngestor::with_api(config, api).await.unwrap();
    (ingestor, temp_dir)
}
