//! End-to-end pipeline scenarios over the built-in segments

use std::time::Duration;

use tokio::time::timeout;

use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::Pipeline;
use flowpipe_segments::default_registry;

fn two_addr_flow() -> FlowRecord {
    FlowRecord {
        src_addr: vec![192, 168, 88, 142],
        dst_addr: vec![192, 168, 88, 143],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_dropfields_between_passes() {
    let registry = default_registry();
    let yaml = r#"
- segment: pass
- segment: dropfields
  config:
    policy: drop
    fields: SrcAddr
- segment: pass
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    assert!(pipeline.inject(two_addr_flow()).await);

    let result = timeout(Duration::from_secs(5), egress.recv())
        .await
        .expect("pipeline output timed out")
        .expect("pipeline output closed early");
    assert!(result.src_addr.is_empty());
    assert_eq!(result.dst_addr, vec![192, 168, 88, 143]);

    pipeline.close().await;
}

#[tokio::test]
async fn test_flowfilter_pipeline() {
    let registry = default_registry();
    let yaml = r#"
- segment: flowfilter
  config:
    filter: proto 4
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    pipeline
        .inject(FlowRecord {
            proto: 5,
            ..Default::default()
        })
        .await;
    pipeline
        .inject(FlowRecord {
            proto: 4,
            ..Default::default()
        })
        .await;

    // Only the matching flow comes out; the first one was swallowed.
    let result = timeout(Duration::from_secs(5), egress.recv())
        .await
        .expect("pipeline output timed out")
        .expect("pipeline output closed early");
    assert_eq!(result.proto, 4);

    pipeline.close().await;
    assert!(egress.recv().await.is_none());
}

#[tokio::test]
async fn test_enrichment_chain() {
    let registry = default_registry();
    let yaml = r#"
- segment: addrstrings
  config:
    macseparator: dash
- segment: protomap
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    let mut flow = two_addr_flow();
    flow.proto = 6;
    flow.src_mac = 0x0000_6655_4433_2211;
    pipeline.inject(flow).await;

    let result = timeout(Duration::from_secs(5), egress.recv())
        .await
        .expect("pipeline output timed out")
        .expect("pipeline output closed early");
    assert_eq!(result.source_ip, "192.168.88.142");
    assert_eq!(result.destination_ip, "192.168.88.143");
    assert_eq!(result.source_mac, "11-22-33-44-55-66");
    assert_eq!(result.proto_name, "TCP");

    pipeline.close().await;
}

#[tokio::test]
async fn test_protomap_values() {
    let registry = default_registry();
    let mut pipeline = Pipeline::from_config(&registry, "- segment: protomap\n").unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    for proto in [6u32, 68, 222] {
        pipeline
            .inject(FlowRecord {
                proto,
                ..Default::default()
            })
            .await;
    }

    let mut names = Vec::new();
    for _ in 0..3 {
        let flow = timeout(Duration::from_secs(5), egress.recv())
            .await
            .expect("pipeline output timed out")
            .expect("pipeline output closed early");
        names.push(flow.proto_name);
    }
    assert_eq!(
        names,
        vec!["TCP", "any distributed file system", "UNKNOWN"]
    );

    pipeline.close().await;
}

#[tokio::test]
async fn test_branch_with_builtin_segments() {
    let registry = default_registry();
    let yaml = r#"
- segment: branch
  config:
    condition: proto 6
  then:
    - segment: protomap
  else:
    - segment: drop
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    let mut egress = pipeline.take_egress().unwrap();
    pipeline.start();

    pipeline
        .inject(FlowRecord {
            proto: 17,
            ..Default::default()
        })
        .await;
    pipeline
        .inject(FlowRecord {
            proto: 6,
            ..Default::default()
        })
        .await;

    // The UDP flow dies in the else arm; only the TCP flow emerges.
    let result = timeout(Duration::from_secs(5), egress.recv())
        .await
        .expect("pipeline output timed out")
        .expect("pipeline output closed early");
    assert_eq!(result.proto, 6);
    assert_eq!(result.proto_name, "TCP");

    timeout(Duration::from_secs(5), pipeline.close())
        .await
        .expect("pipeline close timed out");
    assert!(egress.recv().await.is_none());
}

#[tokio::test]
async fn test_shutdown_is_bounded() {
    let registry = default_registry();
    let yaml = r#"
- segment: pass
- segment: addrstrings
- segment: protomap
- segment: flowfilter
  config:
    filter: bytes >= 0
- segment: pass
"#;
    let mut pipeline = Pipeline::from_config(&registry, yaml).unwrap();
    pipeline.start();
    pipeline.auto_drain();

    for i in 0..100u64 {
        let injected = pipeline
            .inject(FlowRecord {
                bytes: i,
                ..Default::default()
            })
            .await;
        assert!(injected);
    }

    // Closing the ingress must cascade through all five segments promptly.
    timeout(Duration::from_secs(5), pipeline.close())
        .await
        .expect("pipeline shutdown exceeded its bound");
}

#[test]
fn test_unknown_segment_is_a_startup_error() {
    let registry = default_registry();
    let result = Pipeline::from_config(&registry, "- segment: kafkaproducer\n");
    assert!(result.is_err());
}

#[test]
fn test_registry_has_all_builtins() {
    let registry = default_registry();
    for name in [
        "pass",
        "netflow",
        "addrstrings",
        "dropfields",
        "protomap",
        "reversedns",
        "drop",
        "elephant",
        "flowfilter",
        "lumberjack",
    ] {
        assert!(registry.contains(name), "missing segment '{name}'");
    }
}
