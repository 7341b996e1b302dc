//! Tests for flow predicate expressions

use super::{FilterError, FlowPredicate};
use crate::FlowRecord;

fn flow_proto(proto: u32) -> FlowRecord {
    FlowRecord {
        proto,
        ..Default::default()
    }
}

#[test]
fn test_proto_equality() {
    let predicate = FlowPredicate::parse("proto 4").unwrap();
    assert!(predicate.matches(&flow_proto(4)));
    assert!(!predicate.matches(&flow_proto(5)));
}

#[test]
fn test_proto_by_name() {
    let predicate = FlowPredicate::parse("proto tcp").unwrap();
    assert!(predicate.matches(&flow_proto(6)));
    assert!(!predicate.matches(&flow_proto(17)));

    let predicate = FlowPredicate::parse("proto UDP").unwrap();
    assert!(predicate.matches(&flow_proto(17)));
}

#[test]
fn test_port_matches_either_direction() {
    let predicate = FlowPredicate::parse("port 443").unwrap();

    let src = FlowRecord {
        src_port: 443,
        dst_port: 51234,
        ..Default::default()
    };
    let dst = FlowRecord {
        src_port: 51234,
        dst_port: 443,
        ..Default::default()
    };
    let neither = FlowRecord {
        src_port: 80,
        dst_port: 8080,
        ..Default::default()
    };

    assert!(predicate.matches(&src));
    assert!(predicate.matches(&dst));
    assert!(!predicate.matches(&neither));
}

#[test]
fn test_attached_operator() {
    // Operator glued to the value, as written in real configs.
    let predicate = FlowPredicate::parse("port <50").unwrap();
    assert!(predicate.matches(&FlowRecord {
        src_port: 22,
        dst_port: 50000,
        ..Default::default()
    }));
    assert!(!predicate.matches(&FlowRecord {
        src_port: 50,
        dst_port: 51,
        ..Default::default()
    }));
}

#[test]
fn test_comparison_operators() {
    let flow = FlowRecord {
        bytes: 1000,
        ..Default::default()
    };

    assert!(FlowPredicate::parse("bytes >= 1000").unwrap().matches(&flow));
    assert!(FlowPredicate::parse("bytes <= 1000").unwrap().matches(&flow));
    assert!(FlowPredicate::parse("bytes > 999").unwrap().matches(&flow));
    assert!(!FlowPredicate::parse("bytes > 1000").unwrap().matches(&flow));
    assert!(FlowPredicate::parse("bytes == 1000").unwrap().matches(&flow));
}

#[test]
fn test_and_or_precedence() {
    // "and" binds tighter than "or".
    let predicate = FlowPredicate::parse("proto 6 and port 443 or proto 17").unwrap();

    assert!(predicate.matches(&FlowRecord {
        proto: 6,
        dst_port: 443,
        ..Default::default()
    }));
    assert!(predicate.matches(&flow_proto(17)));
    assert!(!predicate.matches(&FlowRecord {
        proto: 6,
        dst_port: 80,
        ..Default::default()
    }));
}

#[test]
fn test_negation() {
    let predicate = FlowPredicate::parse("not proto 6").unwrap();
    assert!(!predicate.matches(&flow_proto(6)));
    assert!(predicate.matches(&flow_proto(17)));

    // Double negation cancels.
    let predicate = FlowPredicate::parse("not not proto 6").unwrap();
    assert!(predicate.matches(&flow_proto(6)));
}

#[test]
fn test_parse_errors() {
    assert!(matches!(FlowPredicate::parse(""), Err(FilterError::Empty)));
    assert!(matches!(
        FlowPredicate::parse("   "),
        Err(FilterError::Empty)
    ));
    assert_eq!(
        FlowPredicate::parse("protoo 4").unwrap_err(),
        FilterError::UnknownField("protoo".into())
    );
    assert_eq!(
        FlowPredicate::parse("proto").unwrap_err(),
        FilterError::MissingValue("proto".into())
    );
    assert_eq!(
        FlowPredicate::parse("proto <").unwrap_err(),
        FilterError::MissingValue("<".into())
    );
    assert_eq!(
        FlowPredicate::parse("proto banana").unwrap_err(),
        FilterError::InvalidValue {
            field: "proto".into(),
            value: "banana".into()
        }
    );
    assert_eq!(
        FlowPredicate::parse("proto 4 proto 5").unwrap_err(),
        FilterError::UnexpectedToken("proto".into())
    );
}

#[test]
fn test_source_preserved() {
    let predicate = FlowPredicate::parse("  proto 4  ").unwrap();
    assert_eq!(predicate.source(), "proto 4");
}
