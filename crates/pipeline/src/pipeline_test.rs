//! Tests for the pipeline runtime

use std::time::Duration;

use tokio::time::timeout;

use super::Pipeline;
use crate::config::SegmentConfig;
use crate::registry::SegmentRegistry;
use crate::segment::SegmentFactory;
use crate::test_segments::{AddBytesFactory, TagFactory};
use crate::testkit;
use flowpipe_flow::FlowRecord;

fn test_registry() -> SegmentRegistry {
    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(AddBytesFactory));
    registry.register(Box::new(TagFactory));
    registry
}

fn flow_bytes(bytes: u64) -> FlowRecord {
    FlowRecord {
        bytes,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_linear_pipeline_preserves_order_and_composes() {
    let registry = test_registry();
    let yaml = r#"
- segment: addbytes
  config:
    amount: 10
- segment: addbytes
  config:
    amount: 100
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    // Feed from a task: the capacity-1 hops hold only a handful of records
    // in flight, so a single-threaded inject-then-read would stall.
    let ingress = pipeline.ingress().unwrap().clone();
    let feeder = tokio::spawn(async move {
        for i in 0..20u64 {
            if ingress.send(flow_bytes(i)).await.is_err() {
                break;
            }
        }
    });

    // FIFO through both stages, each applied exactly once.
    for i in 0..20u64 {
        let flow = egress.recv().await.unwrap();
        assert_eq!(flow.bytes, i + 110);
    }
    feeder.await.unwrap();

    pipeline.close().await;
    // After close the channel is fully shut down.
    assert!(egress.recv().await.is_none());
}

#[tokio::test]
async fn test_close_resolves_barrier() {
    let registry = test_registry();
    let yaml = "- segment: addbytes\n- segment: tag\n";
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    pipeline.start();
    pipeline.auto_drain();

    for _ in 0..5 {
        assert!(pipeline.inject(FlowRecord::default()).await);
    }

    // The shutdown wave must reach every segment within bounded time.
    timeout(Duration::from_secs(5), pipeline.close())
        .await
        .expect("pipeline close timed out");

    assert!(!pipeline.inject(FlowRecord::default()).await);
}

#[tokio::test]
async fn test_close_without_start() {
    let registry = test_registry();
    let mut pipeline = Pipeline::from_config(&registry, "- segment: tag\n").unwrap();
    timeout(Duration::from_secs(1), pipeline.close())
        .await
        .expect("close hung on an unstarted pipeline");
}

#[tokio::test]
async fn test_auto_drain_keeps_terminal_segment_moving() {
    let registry = test_registry();
    let mut pipeline = Pipeline::from_config(&registry, "- segment: addbytes\n").unwrap();
    pipeline.start();
    pipeline.auto_drain();

    // Without a drain these sends would stall on the capacity-1 channels.
    for i in 0..50u64 {
        assert!(pipeline.inject(flow_bytes(i)).await);
    }

    timeout(Duration::from_secs(5), pipeline.close())
        .await
        .expect("pipeline close timed out");
}

#[tokio::test]
async fn test_testkit_runs_single_segment() {
    let config = SegmentConfig::from_pairs([("value", "stamped")]);
    let segment = TagFactory
        .create(&config)
        .map_err(|e| e.to_string())
        .unwrap();

    let output = testkit::run_segment(
        segment,
        vec![FlowRecord::default(), flow_bytes(3)],
    )
    .await;

    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|f| f.proto_name == "stamped"));
    assert_eq!(output[1].bytes, 3);
}

#[tokio::test]
async fn test_inject_after_close_returns_false() {
    let registry = test_registry();
    let mut pipeline = Pipeline::from_config(&registry, "- segment: tag\n").unwrap();
    pipeline.start();
    pipeline.auto_drain();
    pipeline.close().await;

    assert!(!pipeline.inject(FlowRecord::default()).await);
    assert!(pipeline.ingress().is_none());
}
