//! Tests for the addrstrings segment

use super::AddrStringsFactory;
use flowpipe_flow::FlowRecord;
use flowpipe_pipeline::{testkit, SegmentConfig, SegmentFactory};

fn sample_flow() -> FlowRecord {
    FlowRecord {
        src_addr: vec![192, 168, 88, 142],
        dst_addr: vec![192, 168, 88, 143],
        next_hop: vec![10, 0, 0, 1],
        sampler_address: vec![127, 0, 0, 1],
        src_mac: 0x0000_6655_4433_2211,
        dst_mac: 0x0000_0605_0403_0201,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_populates_string_forms() {
    let segment = AddrStringsFactory.create(&SegmentConfig::default()).unwrap();
    let result = testkit::run_segment_single(segment, sample_flow())
        .await
        .unwrap();

    assert_eq!(result.source_ip, "192.168.88.142");
    assert_eq!(result.destination_ip, "192.168.88.143");
    assert_eq!(result.next_hop_ip, "10.0.0.1");
    assert_eq!(result.sampler_ip, "127.0.0.1");
    assert_eq!(result.source_mac, "11:22:33:44:55:66");
    assert_eq!(result.destination_mac, "01:02:03:04:05:06");
}

#[tokio::test]
async fn test_ipv6_uses_rfc5952_form() {
    let mut addr = vec![0u8; 16];
    addr[0] = 0x20;
    addr[1] = 0x01;
    addr[2] = 0x0d;
    addr[3] = 0xb8;
    addr[15] = 0x01;

    let segment = AddrStringsFactory.create(&SegmentConfig::default()).unwrap();
    let flow = FlowRecord {
        src_addr: addr,
        ..Default::default()
    };
    let result = testkit::run_segment_single(segment, flow).await.unwrap();
    assert_eq!(result.source_ip, "2001:db8::1");
}

#[tokio::test]
async fn test_dash_separator_option() {
    let config = SegmentConfig::from_pairs([("macseparator", "dash")]);
    let segment = AddrStringsFactory.create(&config).unwrap();
    let result = testkit::run_segment_single(segment, sample_flow())
        .await
        .unwrap();
    assert_eq!(result.source_mac, "11-22-33-44-55-66");
}

#[tokio::test]
async fn test_unset_fields_stay_empty() {
    let segment = AddrStringsFactory.create(&SegmentConfig::default()).unwrap();
    let result = testkit::run_segment_single(segment, FlowRecord::default())
        .await
        .unwrap();

    assert!(result.source_ip.is_empty());
    assert!(result.destination_ip.is_empty());
    assert!(result.source_mac.is_empty());
    assert!(result.destination_mac.is_empty());
}
