//! Tests for the segment registry

use super::SegmentRegistry;
use crate::config::SegmentConfig;
use crate::error::PipelineError;
use crate::test_segments::{AddBytesFactory, TagFactory};
use crate::testkit;
use flowpipe_flow::FlowRecord;

#[test]
fn test_empty_registry() {
    let registry = SegmentRegistry::new();
    assert!(registry.is_empty());
    assert_eq!(registry.len(), 0);
    assert!(!registry.contains("pass"));
}

#[test]
fn test_register_and_contains() {
    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(AddBytesFactory));
    registry.register(Box::new(TagFactory));

    assert_eq!(registry.len(), 2);
    assert!(registry.contains("addbytes"));
    assert!(registry.contains("tag"));
    assert_eq!(registry.available(), vec!["addbytes", "tag"]);
}

#[test]
fn test_unknown_segment_error_lists_available() {
    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(AddBytesFactory));

    let err = registry
        .create("nope", &SegmentConfig::default())
        .unwrap_err();
    match err {
        PipelineError::UnknownSegment { name, available } => {
            assert_eq!(name, "nope");
            assert!(available.contains("addbytes"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_duplicate_registration_last_wins() {
    // Two factories under the same name: the second one must be the one
    // that `create` uses afterwards.
    struct ShadowFactory;
    impl crate::SegmentFactory for ShadowFactory {
        fn name(&self) -> &'static str {
            "tag"
        }
        fn create(
            &self,
            _config: &SegmentConfig,
        ) -> crate::Result<Box<dyn crate::Segment>> {
            // Reuse the addbytes segment so the two registrations are
            // observably different.
            AddBytesFactory.create(&SegmentConfig::from_pairs([("amount", "7")]))
        }
    }

    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(TagFactory));
    registry.register(Box::new(ShadowFactory));
    assert_eq!(registry.len(), 1);

    let segment = registry.create("tag", &SegmentConfig::default()).unwrap();
    let output = testkit::run_segment(segment, vec![FlowRecord::default()]).await;
    assert_eq!(output.len(), 1);
    assert_eq!(output[0].bytes, 7);
}

#[test]
fn test_factory_error_propagates() {
    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(AddBytesFactory));

    let config = SegmentConfig::from_pairs([("amount", "not-a-number")]);
    assert!(registry.create("addbytes", &config).is_err());
}
