//! Tests for the pass segment

use super::PassFactory;
use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{testkit, SegmentConfig, SegmentFactory};

#[tokio::test]
async fn test_pass_forwards_unchanged() {
    let segment = PassFactory.create(&SegmentConfig::default()).unwrap();

    let flows = vec![
        FlowRecord {
            proto: 6,
            bytes: 100,
            ..Default::default()
        },
        FlowRecord {
            proto: 17,
            bytes: 200,
            ..Default::default()
        },
    ];

    let output = testkit::run_segment(segment, flows.clone()).await;
    assert_eq!(output, flows);
}
