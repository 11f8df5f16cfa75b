//! Per-channel pipeline: resolve, enumerate, fetch in batches, store.

use crate::config::UPSTREAM_MAX_PAGE;
use crate::enumerator::UploadEnumerator;
use crate::error::{Error, Result};
use crate::sink::StoreOutcome;
use crate::sink::dual::combined_error;
use crate::types::{
    ChannelInfo, ChannelOutcome, ChannelReport, ChannelStatus, EnumerationEnd, Event, ItemRef,
    RunMeta, RunParameters,
};
use chrono::{DateTime, Utc};

use super::ChannelIngestor;

/// Result of one channel, plus whether the run must stop after it
pub(crate) struct ChannelRun {
    pub(crate) report: ChannelReport,
    pub(crate) quota_exhausted: bool,
}

/// Mutable state of a channel while it is being ingested
struct ChannelProgress<'a> {
    info: &'a ChannelInfo,
    total_estimate: Option<u64>,
    /// Accepted refs waiting for the next metadata fetch
    buffer: Vec<ItemRef>,
    /// Records stored in this run
    stored: usize,
}

impl ChannelProgress<'_> {
    /// Refs accepted so far, stored or buffered
    fn accepted(&self) -> usize {
        self.stored + self.buffer.len()
    }
}

impl ChannelIngestor {
    /// Ingest one channel reference and report how it ended
    ///
    /// Never fails: every error becomes part of the channel's outcome.
    pub(crate) async fn ingest_channel(
        &self,
        reference: &str,
        params: &RunParameters,
        meta: &RunMeta,
        cutoff: Option<DateTime<Utc>>,
    ) -> ChannelRun {
        let info = match self.resolve_channel(reference).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(reference, error = %e, "skipping channel");
                return ChannelRun {
                    quota_exhausted: e.is_run_fatal(),
                    report: ChannelReport {
                        reference: reference.to_string(),
                        channel_name: None,
                        outcome: ChannelOutcome::Failed {
                            reason: e.failure_reason(),
                        },
                    },
                };
            }
        };

        let total_estimate = estimate(&info, params);
        tracing::info!(
            reference,
            channel = %info.name,
            channel_id = %info.id,
            total_estimate = ?total_estimate,
            "channel ingestion started"
        );
        self.emit_event(Event::ChannelResolved {
            reference: reference.to_string(),
            channel_id: info.id.clone(),
            channel_name: info.name.clone(),
            total_estimate,
        });

        self.sinks.begin_channel(&info).await;

        let mut progress = ChannelProgress {
            info: &info,
            total_estimate,
            buffer: Vec::with_capacity(params.batch_size.min(UPSTREAM_MAX_PAGE)),
            stored: 0,
        };

        let (outcome, status, quota_exhausted) =
            match self.pump(&mut progress, params, meta, cutoff).await {
                Ok(end) => (
                    ChannelOutcome::Completed {
                        count: progress.stored,
                    },
                    ChannelStatus::Complete { end },
                    false,
                ),
                Err(e) => {
                    let reason = e.failure_reason();
                    tracing::warn!(
                        channel = %info.name,
                        stored = progress.stored,
                        error = %e,
                        "channel stopped early"
                    );
                    (
                        ChannelOutcome::stopped(progress.stored, reason.clone()),
                        ChannelStatus::Partial { reason },
                        e.is_run_fatal(),
                    )
                }
            };

        for (sink, e) in self.sinks.finish_channel(&info, &status).await {
            tracing::warn!(channel = %info.name, %sink, error = %e, "failed to record channel status");
            self.emit_event(Event::SinkFailed {
                channel: info.name.clone(),
                sink,
                error: e.to_string(),
            });
        }

        tracing::info!(channel = %info.name, ?outcome, "channel ingestion finished");

        ChannelRun {
            report: ChannelReport {
                reference: reference.to_string(),
                channel_name: Some(info.name.clone()),
                outcome,
            },
            quota_exhausted,
        }
    }

    async fn resolve_channel(&self, reference: &str) -> Result<ChannelInfo> {
        let id = self.pipeline.resolver.resolve(reference).await?;
        self.pipeline.resolver.describe(&id).await
    }

    /// Pull refs from the enumerator into batches until it ends or the cap is hit
    async fn pump(
        &self,
        progress: &mut ChannelProgress<'_>,
        params: &RunParameters,
        meta: &RunMeta,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<EnumerationEnd> {
        let uploads_index = progress
            .info
            .uploads_index
            .clone()
            .ok_or_else(|| Error::NotFound(format!("{} has no upload index", progress.info.id)))?;

        let mut uploads = UploadEnumerator::new(
            self.pipeline.api.clone(),
            self.quota.clone(),
            uploads_index,
            self.config.quota.costs.upload_page,
        )
        .with_cutoff(cutoff)
        .with_paging(
            self.config.api.effective_page_size(),
            self.config.api.page_delay,
        );

        // At most one upstream call per flush
        let batch_size = params.batch_size.min(UPSTREAM_MAX_PAGE);

        loop {
            if params
                .item_cap
                .is_some_and(|cap| progress.accepted() >= cap)
            {
                uploads.stop_capped();
                break;
            }

            match uploads.next().await? {
                Some(item) => {
                    progress.buffer.push(item);
                    if progress.buffer.len() >= batch_size {
                        self.flush(progress, batch_size, meta).await?;
                    }
                }
                None => break,
            }
        }

        if !progress.buffer.is_empty() {
            self.flush(progress, batch_size, meta).await?;
        }

        tracing::debug!(
            channel = %progress.info.name,
            pages = uploads.pages_fetched(),
            "enumeration ended"
        );
        Ok(uploads.end().unwrap_or(EnumerationEnd::Exhausted))
    }

    /// Fetch the buffered refs and hand the records to the sinks
    async fn flush(
        &self,
        progress: &mut ChannelProgress<'_>,
        batch_size: usize,
        meta: &RunMeta,
    ) -> Result<()> {
        let refs = std::mem::take(&mut progress.buffer);
        let records = self
            .pipeline
            .fetcher
            .fetch(&refs, batch_size)
            .await?;

        tracing::debug!(
            channel = %progress.info.name,
            requested = refs.len(),
            fetched = records.len(),
            "batch fetched"
        );
        if records.is_empty() {
            return Ok(());
        }

        match self.sinks.store(progress.info, &records, meta).await {
            StoreOutcome::Ok => {}
            StoreOutcome::PartialOk { failed, error } => {
                tracing::warn!(channel = %progress.info.name, sink = %failed, error = %error, "sink failed, continuing with the other");
                self.emit_event(Event::SinkFailed {
                    channel: progress.info.name.clone(),
                    sink: failed,
                    error: error.to_string(),
                });
            }
            StoreOutcome::Failed { errors } => {
                for (sink, error) in &errors {
                    self.emit_event(Event::SinkFailed {
                        channel: progress.info.name.clone(),
                        sink: *sink,
                        error: error.to_string(),
                    });
                }
                return Err(combined_error(&errors));
            }
        }

        progress.stored += records.len();
        self.emit_event(Event::Progress {
            channel: progress.info.name.clone(),
            items_so_far: progress.stored,
            total_estimate: progress.total_estimate,
        });
        Ok(())
    }
}

/// Expected item count for progress reporting, bounded by the cap
fn estimate(info: &ChannelInfo, params: &RunParameters) -> Option<u64> {
    let cap = params.item_cap.map(|cap| cap as u64);
    match (info.item_count, cap) {
        (Some(count), Some(cap)) => Some(count.min(cap)),
        (count, cap) => count.or(cap),
    }
}
