//! Channel ingestion orchestrator split into focused submodules.
//!
//! The `ChannelIngestor` struct and its methods are organized by domain:
//! - [`run`] - Run entry points, channel sequencing and run-wide stop rules
//! - [`channel`] - Per-channel pipeline (resolve, enumerate, fetch, store)

mod channel;
mod run;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::api::{UpstreamApi, YouTubeClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::Snapshot;
use crate::fetcher::BatchFetcher;
use crate::quota::QuotaTracker;
use crate::resolver::ChannelResolver;
use crate::sink::{ChannelSink, DocumentStore, DualSink, FileStore, StorageStats};
use crate::types::Event;
use std::path::PathBuf;
use std::sync::Arc;

/// Upstream-facing components shared by every channel of a run
#[derive(Clone)]
pub(crate) struct Pipeline {
    /// Upstream API (trait object so tests can script it)
    pub(crate) api: Arc<dyn UpstreamApi>,
    /// Reference resolution with a per-ingestor cache
    pub(crate) resolver: Arc<ChannelResolver>,
    /// Batched metadata fetching
    pub(crate) fetcher: Arc<BatchFetcher>,
}

/// Main ingestor instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct ChannelIngestor {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Process-wide quota budget, shared by every channel and every run
    pub(crate) quota: QuotaTracker,
    /// Resolver, fetcher and the API they call
    pub(crate) pipeline: Pipeline,
    /// Fan-out over the configured sinks
    pub(crate) sinks: Arc<DualSink>,
    /// File store (also the source for exports and stats)
    pub(crate) files: Arc<FileStore>,
    /// Document store, when a connection string is configured
    pub(crate) documents: Option<Arc<DocumentStore>>,
}

impl ChannelIngestor {
    /// Create an ingestor talking to the YouTube Data API
    ///
    /// This initializes all components:
    /// - Creates the data directory
    /// - Connects to the document database and runs migrations (if configured)
    /// - Builds the HTTP client
    /// - Sets up the event broadcast channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API key is configured or the base URL is
    /// invalid, and a database error if the document store cannot be opened.
    pub async fn new(config: Config) -> Result<Self> {
        if config.api.api_key.trim().is_empty() {
            return Err(Error::config("api.api_key", "an API key is required"));
        }
        let api = Arc::new(YouTubeClient::new(&config.api)?);
        Self::with_api(config, api).await
    }

    /// Create an ingestor over any [`UpstreamApi`] implementation
    pub async fn with_api(config: Config, api: Arc<dyn UpstreamApi>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.data_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create data directory '{}': {}",
                        config.storage.data_dir.display(),
                        e
                    ),
                ))
            })?;

        let documents = match &config.storage.document_db_url {
            Some(url) => Some(Arc::new(DocumentStore::connect(url).await?)),
            None => {
                tracing::info!("no document database configured, document sink disabled");
                None
            }
        };

        let files = Arc::new(FileStore::new(config.storage.channels_dir()));
        let sinks = Arc::new(DualSink::new(
            files.clone(),
            documents
                .clone()
                .map(|store| store as Arc<dyn ChannelSink>),
        ));

        let quota = QuotaTracker::new(config.quota.ceiling());
        let costs = config.quota.costs.clone();

        let pipeline = Pipeline {
            resolver: Arc::new(ChannelResolver::new(api.clone(), quota.clone(), costs.clone())),
            fetcher: Arc::new(BatchFetcher::new(
                api.clone(),
                quota.clone(),
                costs.item_batch,
                config.storage.description_limit,
            )),
            api,
        };

        // Buffer of 1000 events; lagging subscribers get RecvError::Lagged
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            data_dir = %config.storage.data_dir.display(),
            quota_ceiling = quota.ceiling(),
            document_sink = documents.is_some(),
            "channel ingestor initialized"
        );

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            quota,
            pipeline,
            sinks,
            files,
            documents,
        })
    }

    /// Subscribe to run events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use channel_ingest::{ChannelIngestor, Config, Event, RunParameters};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut config = Config::default();
    ///     config.api.api_key = std::env::var("YOUTUBE_API_KEY")?;
    ///     let ingestor = ChannelIngestor::new(config).await?;
    ///
    ///     let mut events = ingestor.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             if let Event::Progress { channel, items_so_far, .. } = event {
    ///                 println!("{channel}: {items_so_far} items");
    ///             }
    ///         }
    ///     });
    ///
    ///     let report = ingestor
    ///         .run(&["@rustlang".to_string()], RunParameters::default())
    ///         .await?;
    ///     println!("stored {} items", report.total_items);
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// The process-wide quota tracker
    ///
    /// Exposed for usage reporting and the operator reset.
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// The file store
    pub fn file_store(&self) -> &FileStore {
        &self.files
    }

    /// The document store, when configured
    pub fn document_store(&self) -> Option<&DocumentStore> {
        self.documents.as_deref()
    }

    /// Disk usage of the file store
    pub async fn storage_stats(&self) -> Result<StorageStats> {
        self.files.stats().await
    }

    /// Export every stored channel into a timestamped snapshot file
    ///
    /// Returns the path of the written `export_<YYYYmmdd_HHMMSS>.json`.
    pub async fn export(&self) -> Result<PathBuf> {
        let snapshot = Snapshot::collect(&self.files).await?;
        snapshot.write_to(&self.config.storage.data_dir).await
    }

    /// Close the document database pool
    pub async fn close(&self) {
        if let Some(documents) = &self.documents {
            documents.close().await;
        }
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }
}
