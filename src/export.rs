//! Snapshot export of every ingested channel

use crate::error::Result;
use crate::sink::FileStore;
use crate::sink::file::write_atomic;
use crate::types::ItemRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File name prefix of snapshot exports
const EXPORT_PREFIX: &str = "export_";

/// Timestamped document holding every stored channel collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the snapshot was taken
    pub exported_at: DateTime<Utc>,
    /// Number of channels included
    pub channel_count: usize,
    /// Items across all channels
    pub total_items: usize,
    /// Collections keyed by channel name
    pub channels: BTreeMap<String, Vec<ItemRecord>>,
}

impl Snapshot {
    /// Build a snapshot from the file store's documents
    pub async fn collect(store: &FileStore) -> Result<Self> {
        let channels: BTreeMap<String, Vec<ItemRecord>> = store
            .load_all()
            .await?
            .into_iter()
            .map(|file| (file.channel_name, file.items))
            .collect();

        Ok(Self {
            exported_at: Utc::now(),
            channel_count: channels.len(),
            total_items: channels.values().map(Vec::len).sum(),
            channels,
        })
    }

    /// File name for this snapshot: `export_<YYYYmmdd_HHMMSS>.json`
    pub fn file_name(&self) -> String {
        format!(
            "{EXPORT_PREFIX}{}.json",
            self.exported_at.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write the snapshot atomically into `dir`; returns its path
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        write_atomic(&path, &serde_json::to_vec_pretty(self)?).await?;
        tracing::info!(
            path = %path.display(),
            channels = self.channel_count,
            items = self.total_items,
            "snapshot exported"
        );
        Ok(path)
    }
}
