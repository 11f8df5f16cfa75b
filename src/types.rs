//! Core types and events

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Stable upstream identifier for a channel
///
/// Resolved once per run by the [`ChannelResolver`](crate::resolver::ChannelResolver)
/// and cached for the run's duration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Channel metadata looked up after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Resolved channel identifier
    pub id: ChannelId,
    /// Display name; used as the storage key
    pub name: String,
    /// Identifier of the channel's chronological upload index
    pub uploads_index: Option<String>,
    /// Number of items the channel reports as published
    pub item_count: Option<u64>,
}

/// An item identifier yielded during enumeration
///
/// Ephemeral: consumed by the [`BatchFetcher`](crate::fetcher::BatchFetcher)
/// right after it is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    /// Upstream item identifier
    pub id: String,
    /// Publish time, used for the lookback cutoff
    pub published_at: DateTime<Utc>,
}

/// Full metadata for one item
///
/// Never mutated after creation. Re-ingesting the same identifier produces a
/// new record that replaces the stored one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Upstream item identifier
    pub id: String,
    /// Item title
    pub title: String,
    /// Item description (possibly truncated)
    pub description: String,
    /// Owning channel identifier
    pub channel_id: String,
    /// Owning channel display name
    pub channel_name: String,
    /// Publish time
    pub published_at: DateTime<Utc>,
    /// View counter
    pub view_count: u64,
    /// Like counter
    pub like_count: u64,
    /// Comment counter
    pub comment_count: u64,
    /// ISO-8601 duration as reported upstream (e.g. `PT4M13S`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Medium-size thumbnail URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// Caller-supplied parameters for one run
///
/// Validated once at run start and immutable afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Maximum number of items per metadata fetch
    pub batch_size: usize,
    /// Lookback window in days (0 = unbounded)
    pub lookback_days: u32,
    /// Maximum number of items ingested per channel (None = unbounded)
    pub item_cap: Option<usize>,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            batch_size: 50,
            lookback_days: 365,
            item_cap: None,
        }
    }
}

impl RunParameters {
    /// Check the parameters before a run starts
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size", "batch size must be positive"));
        }
        if self.item_cap == Some(0) {
            return Err(Error::config(
                "item_cap",
                "item cap must be positive (use None for unbounded)",
            ));
        }
        Ok(())
    }

    /// Oldest publish time still accepted, relative to `now`
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.lookback_days > 0).then(|| now - Duration::days(i64::from(self.lookback_days)))
    }
}

/// Run metadata attached to every stored channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Batch size the channel was ingested with
    pub batch_size: usize,
    /// Lookback window in days (0 = unbounded)
    pub lookback_days: u32,
    /// Per-channel item cap, if any
    pub item_cap: Option<usize>,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl RunMeta {
    /// Capture the parameters of a run starting at `started_at`
    pub fn new(params: &RunParameters, started_at: DateTime<Utc>) -> Self {
        Self {
            batch_size: params.batch_size,
            lookback_days: params.lookback_days,
            item_cap: params.item_cap,
            started_at,
        }
    }
}

/// Why enumeration of a channel ended normally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumerationEnd {
    /// Upload index ran out
    Exhausted,
    /// Per-channel item cap reached
    Capped,
    /// First item older than the lookback cutoff reached
    CutoffReached,
}

/// Completion status stored alongside a channel's collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Ingestion is running (or the process died mid-run)
    InProgress,
    /// Enumeration finished
    Complete {
        /// How enumeration ended
        end: EnumerationEnd,
    },
    /// Run stopped before enumeration finished
    Partial {
        /// Why the run stopped
        reason: FailureReason,
    },
}

impl ChannelStatus {
    /// Short label used in the document store
    pub fn label(&self) -> &'static str {
        match self {
            ChannelStatus::InProgress => "in_progress",
            ChannelStatus::Complete { .. } => "complete",
            ChannelStatus::Partial { .. } => "partial",
        }
    }
}

/// Caller-facing failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Channel could not be resolved
    NotFound,
    /// Quota budget spent; the run stopped
    QuotaExceeded,
    /// An upstream call failed
    Transport {
        /// Underlying cause
        message: String,
    },
    /// Both storage sinks failed for a batch
    SinkFailure {
        /// Underlying cause
        message: String,
    },
    /// Caller aborted the run before this channel started
    Aborted,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NotFound => f.write_str("channel not found"),
            FailureReason::QuotaExceeded => f.write_str("quota exceeded"),
            FailureReason::Transport { message } => write!(f, "transport error: {message}"),
            FailureReason::SinkFailure { message } => write!(f, "sink failure: {message}"),
            FailureReason::Aborted => f.write_str("aborted"),
        }
    }
}

/// Per-channel result of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChannelOutcome {
    /// Enumeration finished and every accepted batch was stored
    Completed {
        /// Items stored for the channel in this run
        count: usize,
    },
    /// Some items were stored before the channel stopped
    Partial {
        /// Items stored for the channel in this run
        count: usize,
        /// Why the channel stopped
        reason: FailureReason,
    },
    /// Nothing was stored for the channel
    Failed {
        /// Why the channel failed
        reason: FailureReason,
    },
}

impl ChannelOutcome {
    /// Items stored for the channel in this run
    pub fn count(&self) -> usize {
        match self {
            ChannelOutcome::Completed { count } | ChannelOutcome::Partial { count, .. } => *count,
            ChannelOutcome::Failed { .. } => 0,
        }
    }

    /// Build the outcome for a channel that stopped early
    pub fn stopped(count: usize, reason: FailureReason) -> Self {
        if count > 0 {
            ChannelOutcome::Partial { count, reason }
        } else {
            ChannelOutcome::Failed { reason }
        }
    }
}

/// Outcome of one channel reference in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReport {
    /// The reference as supplied by the caller
    pub reference: String,
    /// Resolved display name, when resolution got that far
    pub channel_name: Option<String>,
    /// What happened
    pub outcome: ChannelOutcome,
}

/// Result of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// One report per input reference, in input order
    pub channels: Vec<ChannelReport>,
    /// Items stored across all channels
    pub total_items: usize,
    /// Quota units consumed at the end of the run
    pub quota_used: u64,
}

impl RunReport {
    /// Whether the run stopped because the quota ran out
    pub fn quota_exhausted(&self) -> bool {
        self.channels.iter().any(|c| {
            matches!(
                &c.outcome,
                ChannelOutcome::Partial { reason: FailureReason::QuotaExceeded, .. }
                    | ChannelOutcome::Failed { reason: FailureReason::QuotaExceeded }
            )
        })
    }
}

/// Which storage sink an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// File-backed store
    File,
    /// Document-database store
    Document,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::File => f.write_str("file"),
            SinkKind::Document => f.write_str("document"),
        }
    }
}

/// Event emitted during a run
///
/// Delivered through a broadcast channel; see
/// [`ChannelIngestor::subscribe`](crate::ChannelIngestor::subscribe). Events
/// are advisory: a lagging subscriber may miss some, but per-channel
/// `items_so_far` values never decrease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run accepted and about to process channels
    RunStarted {
        /// Number of channel references in the run
        channels: usize,
        /// Quota units left when the run started
        quota_remaining: u64,
    },

    /// A channel reference was resolved
    ChannelResolved {
        /// Reference as supplied by the caller
        reference: String,
        /// Resolved identifier
        channel_id: ChannelId,
        /// Display name
        channel_name: String,
        /// Expected number of items, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_estimate: Option<u64>,
    },

    /// A batch was stored
    Progress {
        /// Channel display name
        channel: String,
        /// Items stored for this channel so far in this run
        items_so_far: usize,
        /// Expected number of items, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_estimate: Option<u64>,
    },

    /// One sink failed to store a batch; the other sink kept going
    SinkFailed {
        /// Channel display name
        channel: String,
        /// The failing sink
        sink: SinkKind,
        /// Error message
        error: String,
    },

    /// A channel finished (successfully or not)
    ChannelFinished {
        /// Reference as supplied by the caller
        reference: String,
        /// What happened
        outcome: ChannelOutcome,
    },

    /// Quota ran out; no further upstream calls will be made in this run
    QuotaExhausted {
        /// Units consumed
        used: u64,
        /// Ceiling in force
        limit: u64,
    },

    /// Run finished
    RunFinished {
        /// Items stored across all channels
        total_items: usize,
        /// Quota units consumed
        quota_used: u64,
    },
}
