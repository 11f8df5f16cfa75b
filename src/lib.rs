//! # channel-ingest
//!
//! Quota-aware ingestion of complete channel video catalogs.
//!
//! ## Design Philosophy
//!
//! channel-ingest is designed to be:
//! - **Budget-safe** - Every paid upstream call is reserved against a shared quota first
//! - **Failure-isolated** - One channel's problem never fails its siblings
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Pipeline
//!
//! For each channel reference, the [`ChannelIngestor`] resolves the channel
//! ([`resolver`]), walks its upload index newest-first ([`enumerator`]),
//! fetches item metadata in batches ([`fetcher`]) and hands every batch to
//! the file store and, when configured, the document store ([`sink`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_ingest::{ChannelIngestor, Config, RunParameters};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.api.api_key = std::env::var("YOUTUBE_API_KEY")?;
//!     config.storage.document_db_url = Some("sqlite:data/channels.db".into());
//!
//!     let ingestor = ChannelIngestor::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = ingestor.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let params = RunParameters {
//!         batch_size: 50,
//!         lookback_days: 90,
//!         item_cap: Some(500),
//!     };
//!     let channels = vec!["@rustlang".to_string(), "UC_x5XG1OV2P6uZZ5FSM9Ttw".to_string()];
//!     let report = ingestor.run(&channels, params).await?;
//!
//!     for channel in &report.channels {
//!         println!("{}: {:?}", channel.reference, channel.outcome);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Upstream metadata API
pub mod api;
/// Configuration types
pub mod config;
/// Lazy upload-index enumeration
pub mod enumerator;
/// Error types
pub mod error;
/// Snapshot export
pub mod export;
/// Batched metadata fetching
pub mod fetcher;
/// Ingestion orchestrator (decomposed into focused submodules)
pub mod ingestor;
/// Quota accounting
pub mod quota;
/// Channel reference resolution
pub mod resolver;
/// Storage sinks
pub mod sink;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use api::{UpstreamApi, YouTubeClient};
pub use config::{ApiConfig, Config, QuotaConfig, QuotaCosts, StorageConfig};
pub use error::{DatabaseError, Error, Result};
pub use export::Snapshot;
pub use ingestor::ChannelIngestor;
pub use quota::{QuotaTracker, QuotaUsage};
pub use sink::{ChannelSink, DocumentStore, DualSink, FileStore, StoreOutcome};
pub use types::{
    ChannelId, ChannelInfo, ChannelOutcome, ChannelReport, ChannelStatus, EnumerationEnd, Event,
    FailureReason, ItemRecord, RunParameters, RunReport,
};

/// Run the ingestor, stopping between channels on a termination signal.
///
/// The channel in progress when the signal arrives runs to its end; channels
/// not yet started are reported `Failed(Aborted)`.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if the
///   handlers cannot be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use channel_ingest::{ChannelIngestor, Config, RunParameters, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::default();
///     config.api.api_key = std::env::var("YOUTUBE_API_KEY")?;
///     let ingestor = ChannelIngestor::new(config).await?;
///
///     let channels = vec!["@rustlang".to_string()];
///     let report = run_until_signal(&ingestor, &channels, RunParameters::default()).await?;
///     println!("stored {} items", report.total_items);
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(
    ingestor: &ChannelIngestor,
    channels: &[String],
    params: RunParameters,
) -> Result<RunReport> {
    let abort = tokio_util::sync::CancellationToken::new();
    let trigger = abort.clone();
    let listener = tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    let report = ingestor.run_with_abort(channels, params, abort).await;
    listener.abort();
    report
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, finishing current channel"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, finishing current channel"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, finishing current channel");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, finishing current channel"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
