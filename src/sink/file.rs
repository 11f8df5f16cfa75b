//! File-backed channel store
//!
//! Each channel is one JSON document named after the sanitized channel name.
//! Writes go to a temporary file that is then renamed over the target, so a
//! crash mid-write never leaves a truncated document behind.

use super::ChannelSink;
use crate::error::{Error, Result};
use crate::types::{ChannelInfo, ChannelStatus, ItemRecord, RunMeta, SinkKind};
use crate::utils::sanitize_filename;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// On-disk document for one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFile {
    /// Channel display name (storage key)
    pub channel_name: String,
    /// Upstream channel identifier
    pub channel_id: String,
    /// Last time the document was written
    pub updated_at: DateTime<Utc>,
    /// Number of unique items stored
    pub item_count: usize,
    /// Completion status of the latest run
    pub status: ChannelStatus,
    /// Parameters of the latest run
    pub run: RunMeta,
    /// Stored items, in first-seen order
    pub items: Vec<ItemRecord>,
}

/// Disk usage of the file store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Channel documents on disk
    pub channels: usize,
    /// Items across all channel documents
    pub total_items: usize,
    /// Bytes used by channel documents
    pub total_bytes: u64,
}

/// A channel document held in memory for the duration of a run
struct Collection {
    file: ChannelFile,
    /// Item identifier to position in `file.items`
    index: HashMap<String, usize>,
}

impl Collection {
    fn new(file: ChannelFile) -> Self {
        let index = file
            .items
            .iter()
            .enumerate()
            .map(|(pos, item)| (item.id.clone(), pos))
            .collect();
        Self { file, index }
    }

    fn merge(&mut self, batch: &[ItemRecord]) {
        for record in batch {
            match self.index.get(&record.id) {
                Some(&pos) => self.file.items[pos] = record.clone(),
                None => {
                    self.index.insert(record.id.clone(), self.file.items.len());
                    self.file.items.push(record.clone());
                }
            }
        }
        self.file.item_count = self.file.items.len();
    }
}

/// One-JSON-document-per-channel store under a data directory
pub struct FileStore {
    dir: PathBuf,
    /// Channels touched in the current run, keyed by file stem
    ///
    /// Loaded from disk on a channel's first batch and kept until the channel
    /// finishes, so prior data is read once per channel per run.
    active: Mutex<HashMap<String, Collection>>,
}

impl FileStore {
    /// Create a store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the channel documents
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `channel_name`
    pub fn channel_path(&self, channel_name: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_filename(channel_name)))
    }

    /// Load a channel's stored document, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the document exists but cannot be read or parsed.
    pub async fn load_channel(&self, channel_name: &str) -> Result<Option<ChannelFile>> {
        read_document(&self.channel_path(channel_name)).await
    }

    /// Names of all stored channels, sorted
    pub async fn list_channels(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .load_all()
            .await?
            .into_iter()
            .map(|file| file.channel_name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Every stored channel document, sorted by channel name
    pub async fn load_all(&self) -> Result<Vec<ChannelFile>> {
        let mut files = Vec::new();
        for path in self.document_paths().await? {
            if let Some(file) = read_document(&path).await? {
                files.push(file);
            }
        }
        files.sort_by(|a, b| a.channel_name.cmp(&b.channel_name));
        Ok(files)
    }

    /// Remove a channel's document; returns whether one existed
    pub async fn delete_channel(&self, channel_name: &str) -> Result<bool> {
        let path = self.channel_path(channel_name);
        self.active
            .lock()
            .await
            .remove(&sanitize_filename(channel_name));

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(channel = channel_name, path = %path.display(), "channel document deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Disk usage and item totals across all channel documents
    pub async fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for path in self.document_paths().await? {
            let Some(file) = read_document(&path).await? else {
                continue;
            };
            stats.channels += 1;
            stats.total_items += file.item_count;
            stats.total_bytes += tokio::fs::metadata(&path).await?.len();
        }
        Ok(stats)
    }

    /// Paths of channel documents (temporary files excluded)
    async fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn persist(&self, key: &str, file: &ChannelFile) -> Result<()> {
        let path = self.dir.join(format!("{key}.json"));
        write_atomic(&path, &serde_json::to_vec_pretty(file)?).await
    }
}

#[async_trait]
impl ChannelSink for FileStore {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    async fn begin_channel(&self, channel: &ChannelInfo) -> Result<()> {
        self.active
            .lock()
            .await
            .remove(&sanitize_filename(&channel.name));
        Ok(())
    }

    async fn write_batch(
        &self,
        channel: &ChannelInfo,
        batch: &[ItemRecord],
        meta: &RunMeta,
    ) -> Result<()> {
        let key = sanitize_filename(&channel.name);
        let mut active = self.active.lock().await;

        if !active.contains_key(&key) {
            // Refuse to continue on an unreadable document rather than overwrite it
            let existing = self.load_channel(&channel.name).await?;
            let file = existing.unwrap_or_else(|| ChannelFile {
                channel_name: channel.name.clone(),
                channel_id: channel.id.to_string(),
                updated_at: Utc::now(),
                item_count: 0,
                status: ChannelStatus::InProgress,
                run: meta.clone(),
                items: Vec::new(),
            });
            tracing::debug!(
                channel = %channel.name,
                existing_items = file.items.len(),
                "channel collection loaded"
            );
            active.insert(key.clone(), Collection::new(file));
        }

        let Some(collection) = active.get_mut(&key) else {
            return Err(Error::Other(format!("collection for {key} not loaded")));
        };
        collection.merge(batch);
        collection.file.channel_id = channel.id.to_string();
        collection.file.run = meta.clone();
        collection.file.status = ChannelStatus::InProgress;
        collection.file.updated_at = Utc::now();

        self.persist(&key, &collection.file).await
    }

    async fn finish_channel(&self, channel: &ChannelInfo, status: &ChannelStatus) -> Result<()> {
        let key = sanitize_filename(&channel.name);
        let mut active = self.active.lock().await;

        let mut file = match active.remove(&key) {
            Some(collection) => collection.file,
            None => match self.load_channel(&channel.name).await? {
                Some(file) => file,
                None => return Ok(()),
            },
        };

        file.status = status.clone();
        file.updated_at = Utc::now();
        self.persist(&key, &file).await
    }
}

async fn read_document(path: &Path) -> Result<Option<ChannelFile>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Write `bytes` to `path` via a temporary sibling and a rename
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Other(format!("invalid document path {}", path.display())))?;
    let tmp = dir.join(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::Io(e));
    }
    Ok(())
}
