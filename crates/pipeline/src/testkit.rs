//! Test support for segment implementations
//!
//! Drives a single segment through its full lifecycle with synthetic input
//! and collects everything it emits. Used by the segment test suites; handy
//! for exercising custom segments too.

use flowpipe_flow::FlowRecord;
use tokio::sync::mpsc;

use crate::segment::Segment;
use crate::SEGMENT_CHANNEL_CAPACITY;

/// Run a segment over the given input records and collect its output.
///
/// The input channel is closed after the last record, so the segment's
/// teardown path (drain, flush, drop output) runs as it would in a real
/// pipeline.
pub async fn run_segment(mut segment: Box<dyn Segment>, input: Vec<FlowRecord>) -> Vec<FlowRecord> {
    let (in_tx, in_rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
    let (out_tx, mut out_rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
    segment.rewire(in_rx, out_tx);

    let run = tokio::spawn(segment.run());
    let feed = tokio::spawn(async move {
        for flow in input {
            if in_tx.send(flow).await.is_err() {
                break;
            }
        }
        // in_tx drops here, closing the segment input.
    });

    let mut collected = Vec::new();
    while let Some(flow) = out_rx.recv().await {
        collected.push(flow);
    }

    let _ = feed.await;
    let _ = run.await;
    collected
}

/// Run a segment over a single record; `None` means the segment dropped it.
pub async fn run_segment_single(
    segment: Box<dyn Segment>,
    flow: FlowRecord,
) -> Option<FlowRecord> {
    run_segment(segment, vec![flow]).await.into_iter().next()
}
