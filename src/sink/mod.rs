//! Storage sinks for ingested batches
//!
//! ## Submodules
//!
//! - [`file`] - One JSON document per channel, written atomically
//! - [`document`] - SQLite-backed document store with per-item rows
//! - [`dual`] - Fan-out over both sinks with independent failure
//!
//! Both stores share the same merge policy: records are keyed by item
//! identifier within a channel, new identifiers are appended and re-ingested
//! ones replace the stored record wholesale (last write wins).

use crate::error::Result;
use crate::types::{ChannelInfo, ChannelStatus, ItemRecord, RunMeta, SinkKind};
use async_trait::async_trait;

pub mod document;
pub mod dual;
pub mod file;

pub use document::{ChannelSummary, DocumentStore};
pub use dual::{DualSink, StoreOutcome};
pub use file::{ChannelFile, FileStore, StorageStats};

/// A persistence backend for channel collections
///
/// Calls for one channel are made in order: `begin_channel`, any number of
/// `write_batch`, then `finish_channel`. Calls for different channels may
/// interleave.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    /// Which sink this is
    fn kind(&self) -> SinkKind;

    /// Prepare for a channel's run
    ///
    /// Drops any state left from an earlier run of the same channel, so that
    /// prior data is reloaded once on the first batch.
    async fn begin_channel(&self, channel: &ChannelInfo) -> Result<()>;

    /// Merge a batch into the channel's collection
    async fn write_batch(
        &self,
        channel: &ChannelInfo,
        batch: &[ItemRecord],
        meta: &RunMeta,
    ) -> Result<()>;

    /// Record how the channel's run ended
    ///
    /// A channel with nothing stored is left untouched.
    async fn finish_channel(&self, channel: &ChannelInfo, status: &ChannelStatus) -> Result<()>;
}
