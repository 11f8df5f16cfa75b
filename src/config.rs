//! Configuration types for channel-ingest

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Largest page / batch the upstream API accepts in one call
pub const UPSTREAM_MAX_PAGE: usize = 50;

/// Subdirectory of `data_dir` holding the channel documents
pub const CHANNELS_DIR: &str = "channels";

/// Upstream metadata API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the upstream API (default: YouTube Data API v3)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key appended to every request
    #[serde(default)]
    pub api_key: String,

    /// Per-call timeout (default: 30 seconds)
    ///
    /// A stalled upstream call would otherwise block its channel indefinitely.
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Items requested per upload-index page (default: 50, clamped to 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pause between consecutive page requests (default: 100ms)
    #[serde(default = "default_page_delay", with = "millis_serde")]
    pub page_delay: Duration,

    /// User-Agent header sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            request_timeout: default_request_timeout(),
            page_size: default_page_size(),
            page_delay: default_page_delay(),
            user_agent: default_user_agent(),
        }
    }
}

impl ApiConfig {
    /// Page size actually requested upstream
    pub fn effective_page_size(&self) -> usize {
        self.page_size.clamp(1, UPSTREAM_MAX_PAGE)
    }
}

/// Quota cost of each upstream call type, in units
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaCosts {
    /// Channel lookup by free-text name (real YouTube API: 100)
    #[serde(default = "default_unit_cost")]
    pub search: u64,

    /// Channel metadata lookup by identifier
    #[serde(default = "default_unit_cost")]
    pub channel_lookup: u64,

    /// One page of the upload index
    #[serde(default = "default_unit_cost")]
    pub upload_page: u64,

    /// One batch metadata fetch, independent of batch size
    #[serde(default = "default_unit_cost")]
    pub item_batch: u64,
}

impl Default for QuotaCosts {
    fn default() -> Self {
        Self {
            search: 1,
            channel_lookup: 1,
            upload_page: 1,
            item_batch: 1,
        }
    }
}

/// Quota budget configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Daily budget granted by the upstream API (default: 10 000)
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,

    /// Fraction of the daily budget a process may spend (default: 0.8)
    ///
    /// Leaves headroom for other consumers of the same key.
    #[serde(default = "default_usable_fraction")]
    pub usable_fraction: f64,

    /// Cost of each call type
    #[serde(default)]
    pub costs: QuotaCosts,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            usable_fraction: default_usable_fraction(),
            costs: QuotaCosts::default(),
        }
    }
}

impl QuotaConfig {
    /// Hard ceiling enforced by the quota tracker
    pub fn ceiling(&self) -> u64 {
        let fraction = self.usable_fraction.clamp(0.0, 1.0);
        (self.daily_limit as f64 * fraction).floor() as u64
    }
}

/// Storage sink configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the file store (default: "./data")
    ///
    /// Channel documents live in its `channels/` subdirectory, exports at the root.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Document database connection string (None = document sink disabled)
    #[serde(default)]
    pub document_db_url: Option<String>,

    /// Maximum description length in characters (default: 500, None = keep all)
    #[serde(default = "default_description_limit")]
    pub description_limit: Option<usize>,
}

impl StorageConfig {
    /// Directory holding one JSON document per channel
    pub fn channels_dir(&self) -> PathBuf {
        self.data_dir.join(CHANNELS_DIR)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            document_db_url: None,
            description_limit: default_description_limit(),
        }
    }
}

/// Main configuration for [`ChannelIngestor`](crate::ChannelIngestor)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Quota budget
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Storage sinks
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    UPSTREAM_MAX_PAGE
}

fn default_page_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_user_agent() -> String {
    format!("channel-ingest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_unit_cost() -> u64 {
    1
}

fn default_daily_limit() -> u64 {
    10_000
}

fn default_usable_fraction() -> f64 {
    0.8
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_description_limit() -> Option<usize> {
    Some(500)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.api.base_url, "https://www.googleapis.com/youtube/v3");
        assert_eq!(config.api.page_size, 50);
        assert_eq!(config.api.request_timeout, Duration::from_secs(30));
        assert_eq!(config.quota.daily_limit, 10_000);
        assert_eq!(config.quota.costs, QuotaCosts::default());
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(
            config.storage.channels_dir(),
            PathBuf::from("./data").join("channels")
        );
        assert_eq!(config.storage.document_db_url, None);
        assert_eq!(config.storage.description_limit, Some(500));
    }

    #[test]
    fn ceiling_applies_usable_fraction() {
        let quota = QuotaConfig {
            daily_limit: 10_000,
            usable_fraction: 0.8,
            ..QuotaConfig::default()
        };
        assert_eq!(quota.ceiling(), 8_000);

        let full = QuotaConfig {
            usable_fraction: 1.0,
            ..quota.clone()
        };
        assert_eq!(full.ceiling(), 10_000);

        let out_of_range = QuotaConfig {
            usable_fraction: 3.5,
            ..quota
        };
        assert_eq!(
            out_of_range.ceiling(),
            10_000,
            "fraction above 1.0 must be clamped"
        );
    }

    #[test]
    fn page_size_is_clamped_to_upstream_limit() {
        let api = ApiConfig {
            page_size: 500,
            ..ApiConfig::default()
        };
        assert_eq!(api.effective_page_size(), UPSTREAM_MAX_PAGE);

        let api = ApiConfig {
            page_size: 0,
            ..ApiConfig::default()
        };
        assert_eq!(api.effective_page_size(), 1);
    }

    #[test]
    fn durations_serialize_as_integers() {
        let api = ApiConfig {
            request_timeout: Duration::from_secs(12),
            page_delay: Duration::from_millis(250),
            ..ApiConfig::default()
        };

        let json = serde_json::to_value(&api).expect("serialize failed");

        assert_eq!(json["request_timeout"], 12);
        assert_eq!(json["page_delay"], 250);
    }

    #[test]
    fn quota_costs_override_individually() {
        let json = r#"{"quota":{"costs":{"search":100}}}"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.quota.costs.search, 100);
        assert_eq!(config.quota.costs.upload_page, 1);
        assert_eq!(config.quota.usable_fraction, 0.8);
    }
}
