use super::test_helpers::*;
use super::*;
use crate::types::{
    ChannelOutcome, ChannelStatus, EnumerationEnd, FailureReason, RunParameters, RunReport,
    SinkKind,
};


/// Run parameters without a lookback window
fn unbounded(batch_size: usize, item_cap: Option<usize>) -> RunParameters {
    RunParameters {
        batch_size,
        lookback_days: 0,
        item_cap,
    }
}

fn refs(tags: &[&str]) -> Vec<String> {
    tags.iter().map(|tag| channel_id(tag).to_string()).collect()
}

fn outcomes(report: &RunReport) -> Vec<ChannelOutcome> {
    report.channels.iter().map(|c| c.outcome.clone()).collect()
}
