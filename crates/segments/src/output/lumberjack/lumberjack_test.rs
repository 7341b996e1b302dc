//! Tests for lumberjack option parsing

use std::time::Duration;

use super::client::TlsMode;
use super::{parse_options, LumberjackFactory};
use flowpipe_pipeline::{SegmentConfig, SegmentFactory};

fn with_servers(extra: &[(&str, &str)]) -> SegmentConfig {
    let mut pairs = vec![("servers", "tcp://collector.example.com:5044")];
    pairs.extend_from_slice(extra);
    SegmentConfig::from_pairs(pairs)
}

#[test]
fn test_defaults() {
    let options = parse_options(&with_servers(&[])).unwrap();
    assert_eq!(options.queue_size, 65536);
    assert_eq!(options.batch_size, 64);
    assert_eq!(options.batch_timeout, Duration::from_secs(5));
    assert_eq!(options.reconnect_wait, Duration::from_secs(1));
    assert!(!options.batch_debug);
    assert_eq!(options.queue_status_interval, Duration::ZERO);

    let server = &options.servers[0];
    assert_eq!(server.authority, "collector.example.com:5044");
    assert_eq!(server.host, "collector.example.com");
    assert_eq!(server.tls, TlsMode::Off);
    assert_eq!(server.compression, 0);
    assert_eq!(server.parallelism, 1);
}

#[test]
fn test_servers_required() {
    assert!(parse_options(&SegmentConfig::default()).is_err());
    assert!(parse_options(&SegmentConfig::from_pairs([("servers", " , ")])).is_err());
}

#[test]
fn test_server_schemes() {
    let config = SegmentConfig::from_pairs([(
        "servers",
        "tcp://a.example:5044, tls://b.example:5044, tlsnoverify://c.example:5044",
    )]);
    let options = parse_options(&config).unwrap();
    assert_eq!(options.servers.len(), 3);
    assert_eq!(options.servers[0].tls, TlsMode::Off);
    assert_eq!(options.servers[1].tls, TlsMode::Verify);
    assert_eq!(options.servers[2].tls, TlsMode::NoVerify);
}

#[test]
fn test_invalid_server_urls() {
    for servers in [
        "http://a.example:5044",
        "tcp://a.example",
        "tcp://:5044",
        "not a url",
        "tcp://a.example:5044?banana=1",
    ] {
        let config = SegmentConfig::from_pairs([("servers", servers)]);
        assert!(parse_options(&config).is_err(), "accepted {servers}");
    }
}

#[test]
fn test_ipv6_authority_keeps_brackets() {
    let config = SegmentConfig::from_pairs([("servers", "tlsnoverify://[2001:db8::1]:5044")]);
    let options = parse_options(&config).unwrap();
    assert_eq!(options.servers[0].authority, "[2001:db8::1]:5044");
    assert_eq!(options.servers[0].host, "2001:db8::1");
}

#[test]
fn test_compression_levels() {
    let options = parse_options(&with_servers(&[("compression", "3")])).unwrap();
    assert_eq!(options.servers[0].compression, 3);

    // Per-URL override beats the default.
    let config = SegmentConfig::from_pairs([
        ("servers", "tcp://a.example:5044?compression=9"),
        ("compression", "3"),
    ]);
    let options = parse_options(&config).unwrap();
    assert_eq!(options.servers[0].compression, 9);

    assert!(parse_options(&with_servers(&[("compression", "10")])).is_err());
    let config = SegmentConfig::from_pairs([("servers", "tcp://a.example:5044?compression=10")]);
    assert!(parse_options(&config).is_err());
}

#[test]
fn test_count_clamping() {
    let config = SegmentConfig::from_pairs([("servers", "tcp://a.example:5044?count=0")]);
    assert_eq!(parse_options(&config).unwrap().servers[0].parallelism, 1);

    let config = SegmentConfig::from_pairs([("servers", "tcp://a.example:5044?count=-3")]);
    assert_eq!(parse_options(&config).unwrap().servers[0].parallelism, 1);

    let config = SegmentConfig::from_pairs([("servers", "tcp://a.example:5044?count=4")]);
    assert_eq!(parse_options(&config).unwrap().servers[0].parallelism, 4);
}

#[test]
fn test_queue_size_clamping() {
    let options = parse_options(&with_servers(&[("queuesize", "63")])).unwrap();
    assert_eq!(options.queue_size, 65536);

    let options = parse_options(&with_servers(&[("queuesize", "64")])).unwrap();
    assert_eq!(options.queue_size, 64);

    assert!(parse_options(&with_servers(&[("queuesize", "plenty")])).is_err());
}

#[test]
fn test_batch_size() {
    let options = parse_options(&with_servers(&[("batchsize", "1024")])).unwrap();
    assert_eq!(options.batch_size, 1024);

    // Zero cannot make progress; falls back to the default.
    let options = parse_options(&with_servers(&[("batchsize", "0")])).unwrap();
    assert_eq!(options.batch_size, 64);

    // Digit separators as written in real configs.
    let options = parse_options(&with_servers(&[("batchsize", "2_048")])).unwrap();
    assert_eq!(options.batch_size, 2048);
}

#[test]
fn test_batch_timeout_clamping() {
    let options = parse_options(&with_servers(&[("batchtimeout", "2000ms")])).unwrap();
    assert_eq!(options.batch_timeout, Duration::from_secs(2));

    // Below 50ms and above 60s fall back to the default.
    let options = parse_options(&with_servers(&[("batchtimeout", "10ms")])).unwrap();
    assert_eq!(options.batch_timeout, Duration::from_secs(5));
    let options = parse_options(&with_servers(&[("batchtimeout", "2m")])).unwrap();
    assert_eq!(options.batch_timeout, Duration::from_secs(5));

    // The boundaries themselves are valid.
    let options = parse_options(&with_servers(&[("batchtimeout", "50ms")])).unwrap();
    assert_eq!(options.batch_timeout, Duration::from_millis(50));
    let options = parse_options(&with_servers(&[("batchtimeout", "60s")])).unwrap();
    assert_eq!(options.batch_timeout, Duration::from_secs(60));

    assert!(parse_options(&with_servers(&[("batchtimeout", "soon")])).is_err());
}

#[test]
fn test_misc_options() {
    let options = parse_options(&with_servers(&[
        ("reconnectwait", "250ms"),
        ("batchdebug", "true"),
        ("queuestatusinterval", "10s"),
    ]))
    .unwrap();
    assert_eq!(options.reconnect_wait, Duration::from_millis(250));
    assert!(options.batch_debug);
    assert_eq!(options.queue_status_interval, Duration::from_secs(10));
}

#[test]
fn test_factory_builds_segment() {
    let config = with_servers(&[("batchsize", "3"), ("batchtimeout", "100ms")]);
    assert!(LumberjackFactory.create(&config).is_ok());
}

#[test]
fn test_worker_count_per_server() {
    let config = SegmentConfig::from_pairs([(
        "servers",
        "tcp://a.example:5044?count=2, tcp://b.example:5044",
    )]);
    let options = parse_options(&config).unwrap();
    let total: usize = options.servers.iter().map(|s| s.parallelism).sum();
    assert_eq!(total, 3);
}
