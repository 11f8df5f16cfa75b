//! Fan-out over the file store and the optional document store

use super::ChannelSink;
use crate::error::{Error, Result};
use crate::types::{ChannelInfo, ChannelStatus, ItemRecord, RunMeta, SinkKind};
use std::sync::Arc;

/// Result of storing one batch in both sinks
#[derive(Debug)]
pub enum StoreOutcome {
    /// Every configured sink stored the batch
    Ok,
    /// Exactly one sink failed; the other stored the batch
    PartialOk {
        /// The failing sink
        failed: SinkKind,
        /// Why it failed
        error: Error,
    },
    /// No sink stored the batch
    Failed {
        /// Failure of each sink, in sink order
        errors: Vec<(SinkKind, Error)>,
    },
}

/// Writes every batch to the file store and, if configured, the document store
///
/// Each sink's write is attempted and judged on its own; one sink failing
/// never prevents the other from being written.
pub struct DualSink {
    file: Arc<dyn ChannelSink>,
    document: Option<Arc<dyn ChannelSink>>,
}

impl DualSink {
    /// Combine a file sink with an optional document sink
    pub fn new(file: Arc<dyn ChannelSink>, document: Option<Arc<dyn ChannelSink>>) -> Self {
        Self { file, document }
    }

    /// Whether a document sink is configured
    pub fn has_document_sink(&self) -> bool {
        self.document.is_some()
    }

    /// Reset per-channel state in both sinks
    ///
    /// Failures are logged; the channel's writes will surface them again.
    pub async fn begin_channel(&self, channel: &ChannelInfo) {
        for sink in self.sinks() {
            if let Err(e) = sink.begin_channel(channel).await {
                tracing::warn!(channel = %channel.name, sink = %sink.kind(), error = %e, "sink failed to prepare channel");
            }
        }
    }

    /// Store `batch` in both sinks concurrently
    pub async fn store(
        &self,
        channel: &ChannelInfo,
        batch: &[ItemRecord],
        meta: &RunMeta,
    ) -> StoreOutcome {
        let file = self.file.write_batch(channel, batch, meta);
        let (file_result, document_result) = match &self.document {
            Some(document) => {
                let (f, d) = tokio::join!(file, document.write_batch(channel, batch, meta));
                (f, Some(d))
            }
            None => (file.await, None),
        };

        let mut errors = Vec::new();
        if let Err(e) = file_result {
            errors.push((SinkKind::File, e));
        }
        if let Some(Err(e)) = document_result {
            errors.push((SinkKind::Document, e));
        }

        let attempted = if self.document.is_some() { 2 } else { 1 };
        match errors.len() {
            0 => StoreOutcome::Ok,
            n if n < attempted => {
                let (failed, error) = errors.remove(0);
                StoreOutcome::PartialOk { failed, error }
            }
            _ => StoreOutcome::Failed { errors },
        }
    }

    /// Record the channel's final status in both sinks
    ///
    /// Returns the sinks that failed to record it.
    pub async fn finish_channel(
        &self,
        channel: &ChannelInfo,
        status: &ChannelStatus,
    ) -> Vec<(SinkKind, Error)> {
        let mut failures = Vec::new();
        for sink in self.sinks() {
            if let Err(e) = sink.finish_channel(channel, status).await {
                failures.push((sink.kind(), e));
            }
        }
        failures
    }

    fn sinks(&self) -> impl Iterator<Item = &Arc<dyn ChannelSink>> {
        std::iter::once(&self.file).chain(self.document.iter())
    }
}

/// Collapse the per-sink errors of a failed store into one error
pub(crate) fn combined_error(errors: &[(SinkKind, Error)]) -> Error {
    let message = errors
        .iter()
        .map(|(kind, e)| format!("{kind}: {e}"))
        .collect::<Vec<_>>()
        .join("; ");
    Error::Sink {
        sink: "all".into(),
        message,
    }
}

/// Fail every write; used to exercise sink outages
#[cfg(test)]
pub(crate) struct FailingSink(pub SinkKind);

#[cfg(test)]
#[async_trait::async_trait]
impl ChannelSink for FailingSink {
    fn kind(&self) -> SinkKind {
        self.0
    }

    async fn begin_channel(&self, _channel: &ChannelInfo) -> Result<()> {
        Ok(())
    }

    async fn write_batch(
        &self,
        _channel: &ChannelInfo,
        _batch: &[ItemRecord],
        _meta: &RunMeta,
    ) -> Result<()> {
        Err(Error::Sink {
            sink: self.0.to_string(),
            message: "connection refused".into(),
        })
    }

    async fn finish_channel(&self, _channel: &ChannelInfo, _status: &ChannelStatus) -> Result<()> {
        Err(Error::Sink {
            sink: self.0.to_string(),
            message: "connection refused".into(),
        })
    }
}
