//! Tests for the netflow collector configuration

use std::time::Duration;

use super::{parse_options, CollectorMetrics, Listener, NetflowFactory, RateLimited};
use flowpipe_pipeline::{SegmentConfig, SegmentFactory};

#[test]
fn test_default_options() {
    let options = parse_options(&SegmentConfig::default()).unwrap();
    assert_eq!(
        options.listeners,
        vec![Listener {
            host: "0.0.0.0".into(),
            port: 2055
        }]
    );
    assert_eq!(options.workers, 1);
    assert_eq!(options.sockets, 1);
    assert_eq!(options.queue_size, 1_000_000);
    assert_eq!(options.metrics_address, None);
}

#[test]
fn test_multiple_listeners() {
    let config = SegmentConfig::from_pairs([(
        "listen",
        "netflow://127.0.0.1:2055, netflow://10.0.0.1:9995",
    )]);
    let options = parse_options(&config).unwrap();
    assert_eq!(options.listeners.len(), 2);
    assert_eq!(options.listeners[1].port, 9995);
}

#[test]
fn test_empty_host_defaults_to_any() {
    let config = SegmentConfig::from_pairs([("listen", "netflow://0.0.0.0:2055")]);
    let options = parse_options(&config).unwrap();
    assert_eq!(options.listeners[0].host, "0.0.0.0");
}

#[test]
fn test_rejected_schemes() {
    for listen in ["sflow://0.0.0.0:6343", "tcp://0.0.0.0:2055", "not a url"] {
        let config = SegmentConfig::from_pairs([("listen", listen)]);
        assert!(parse_options(&config).is_err(), "accepted {listen}");
    }
}

#[test]
fn test_missing_port_is_rejected() {
    let config = SegmentConfig::from_pairs([("listen", "netflow://127.0.0.1")]);
    assert!(parse_options(&config).is_err());
}

#[test]
fn test_zero_workers_rejected() {
    assert!(parse_options(&SegmentConfig::from_pairs([("workers", "0")])).is_err());
    assert!(parse_options(&SegmentConfig::from_pairs([("sockets", "0")])).is_err());
    assert!(parse_options(&SegmentConfig::from_pairs([("queuesize", "0")])).is_err());
}

#[test]
fn test_factory_accepts_valid_config() {
    let config = SegmentConfig::from_pairs([
        ("listen", "netflow://127.0.0.1:2055"),
        ("workers", "2"),
        ("queuesize", "1024"),
    ]);
    assert!(NetflowFactory.create(&config).is_ok());
}

#[test]
fn test_metrics_render() {
    let metrics = CollectorMetrics::default();
    metrics.record_packet();
    metrics.record_packet();
    metrics.record_flow();
    metrics.record_decode_error();

    let text = metrics.render();
    assert!(text.contains("flowpipe_netflow_packets_total 2"));
    assert!(text.contains("flowpipe_netflow_flows_total 1"));
    assert!(text.contains("flowpipe_netflow_decode_errors_total 1"));
    assert!(text.contains("flowpipe_netflow_dropped_flows_total 0"));
    assert!(text.contains("# TYPE flowpipe_netflow_packets_total counter"));
}

#[test]
fn test_rate_limited_permits() {
    let limiter = RateLimited::new(Duration::from_secs(60));
    assert!(limiter.permit());
    assert!(!limiter.permit());
}
