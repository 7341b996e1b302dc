//! Tests for the IANA protocol table

use super::{protocol_name, protocol_name_lowercase, protocol_number};

#[test]
fn test_well_known_protocols() {
    assert_eq!(protocol_name(0), "HOPOPT");
    assert_eq!(protocol_name(1), "ICMP");
    assert_eq!(protocol_name(6), "TCP");
    assert_eq!(protocol_name(17), "UDP");
    assert_eq!(protocol_name(58), "IPv6-ICMP");
    assert_eq!(protocol_name(132), "SCTP");
}

#[test]
fn test_descriptive_entries() {
    // Entries without a short name carry the registry description.
    assert_eq!(protocol_name(68), "any distributed file system");
    assert_eq!(protocol_name(99), "any private encryption scheme");
}

#[test]
fn test_boundaries() {
    assert_eq!(protocol_name(255), "Reserved");
    assert_eq!(protocol_name(222), "");
    assert_eq!(protocol_name(256), "");
    assert_eq!(protocol_name(u32::MAX), "");
}

#[test]
fn test_lowercase_names() {
    assert_eq!(protocol_name_lowercase(6), "tcp");
    assert_eq!(protocol_name_lowercase(58), "ipv6-icmp");
    assert_eq!(protocol_name_lowercase(222), "");
}

#[test]
fn test_name_to_number() {
    assert_eq!(protocol_number("tcp"), Some(6));
    assert_eq!(protocol_number("TCP"), Some(6));
    assert_eq!(protocol_number("udp"), Some(17));
    assert_eq!(protocol_number("no-such-protocol"), None);
    // Empty names never match, even though the table holds empty entries.
    assert_eq!(protocol_number(""), None);
}
