//! Tests for the drop segment

use super::DropFactory;
use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{testkit, SegmentConfig, SegmentFactory};

#[tokio::test]
async fn test_drops_everything() {
    let segment = DropFactory.create(&SegmentConfig::default()).unwrap();
    let flows = (0..10)
        .map(|i| FlowRecord {
            bytes: i,
            ..Default::default()
        })
        .collect();
    let output = testkit::run_segment(segment, flows).await;
    assert!(output.is_empty());
}
