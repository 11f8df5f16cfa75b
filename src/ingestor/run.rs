//! Run entry points and channel sequencing.

use crate::error::Result;
use crate::types::{
    ChannelOutcome, ChannelReport, Event, FailureReason, RunMeta, RunParameters, RunReport,
};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::ChannelIngestor;

impl ChannelIngestor {
    /// Ingest every channel in `channels`, one after another
    ///
    /// Every reference gets a [`ChannelReport`] in the returned [`RunReport`],
    /// in input order. Per-channel problems never fail the run; only invalid
    /// parameters do.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `params` is invalid.
    pub async fn run(&self, channels: &[String], params: RunParameters) -> Result<RunReport> {
        self.run_with_abort(channels, params, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early once `abort` is cancelled
    ///
    /// The token is checked between channels: a channel that has started runs
    /// to its end, and every channel not yet started is reported
    /// `Failed(Aborted)`.
    pub async fn run_with_abort(
        &self,
        channels: &[String],
        params: RunParameters,
        abort: CancellationToken,
    ) -> Result<RunReport> {
        params.validate()?;

        let started_at = Utc::now();
        let meta = RunMeta::new(&params, started_at);
        let cutoff = params.cutoff(started_at);

        tracing::info!(
            channels = channels.len(),
            batch_size = params.batch_size,
            lookback_days = params.lookback_days,
            item_cap = ?params.item_cap,
            quota_remaining = self.quota.remaining(),
            "ingestion run started"
        );
        self.emit_event(Event::RunStarted {
            channels: channels.len(),
            quota_remaining: self.quota.remaining(),
        });

        let mut reports = Vec::with_capacity(channels.len());
        // Once set, every remaining channel is skipped with this reason
        let mut stop: Option<FailureReason> = None;

        for reference in channels {
            if stop.is_none() && abort.is_cancelled() {
                tracing::info!("run aborted by caller, skipping remaining channels");
                stop = Some(FailureReason::Aborted);
            }

            let report = match &stop {
                Some(reason) => ChannelReport {
                    reference: reference.clone(),
                    channel_name: None,
                    outcome: ChannelOutcome::Failed {
                        reason: reason.clone(),
                    },
                },
                None => {
                    let run = self.ingest_channel(reference, &params, &meta, cutoff).await;
                    if run.quota_exhausted {
                        let usage = self.quota.usage();
                        tracing::warn!(
                            used = usage.used,
                            limit = usage.limit,
                            "quota exhausted, stopping run"
                        );
                        self.emit_event(Event::QuotaExhausted {
                            used: usage.used,
                            limit: usage.limit,
                        });
                        stop = Some(FailureReason::QuotaExceeded);
                    }
                    run.report
                }
            };

            self.emit_event(Event::ChannelFinished {
                reference: reference.clone(),
                outcome: report.outcome.clone(),
            });
            reports.push(report);
        }

        let total_items = reports.iter().map(|r| r.outcome.count()).sum();
        let quota_used = self.quota.used();

        tracing::info!(total_items, quota_used, "ingestion run finished");
        self.emit_event(Event::RunFinished {
            total_items,
            quota_used,
        });

        Ok(RunReport {
            channels: reports,
            total_items,
            quota_used,
        })
    }
}
