//! Test configuration helpers for loading .env credentials and creating test ingestors

use channel_ingest::{ChannelIngestor, Config};
use std::time::Duration;
use tempfile::TempDir;

/// Error type for test configuration
#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Configuration rooted in `temp_dir` with no pacing between pages
pub fn local_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = temp_dir.path().join("data");
    config.api.page_delay = Duration::ZERO;
    config.quota.usable_fraction = 1.0;
    config
}

/// Ingestor pointed at a mock server
///
/// Returns the ingestor and temp directory (keep temp_dir alive for test duration)
pub async fn create_mock_ingestor(
    base_url: &str,
    configure: impl FnOnce(&mut Config),
) -> (ChannelIngestor, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = local_config(&temp_dir);
    config.api.base_url = base_url.to_string();
    config.api.api_key = "test-key".to_string();
    configure(&mut config);
    let ingestor = ChannelIngestor::new(config).await.unwrap();
    (ingestor, temp_dir)
}

/// Load the API key from the environment
///
/// Required environment variables:
/// - `YOUTUBE_API_KEY` - Data API key with quota available
pub fn load_api_key() -> Result<String, ConfigError> {
    dotenvy::dotenv().ok();

    std::env::var("YOUTUBE_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError("YOUTUBE_API_KEY not set in environment".to_string()))
}

/// Check whether live credentials are available
pub fn has_live_credentials() -> bool {
    load_api_key().is_ok()
}

/// Create an ingestor against the real API with a small quota fraction
///
/// Returns the ingestor and temp directory (keep temp_dir alive for test duration)
pub async fn create_live_ingestor() -> Result<(ChannelIngestor, TempDir), Box<dyn std::error::Error>>
{
    let api_key = load_api_key()?;
    let temp_dir = tempfile::tempdir()?;

    let mut config = local_config(&temp_dir);
    config.api.api_key = api_key;
    config.api.page_delay = Duration::from_millis(200);
    config.quota.costs.search = 100;
    // Live tests must never spend more than a sliver of the daily budget
    config.quota.usable_fraction = 0.02;
    config.storage.document_db_url = Some(format!(
        "sqlite:{}",
        temp_dir.path().join("documents.db").display()
    ));

    let ingestor = ChannelIngestor::new(config).await?;
    Ok((ingestor, temp_dir))
}
