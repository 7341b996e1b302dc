//! Elastic Common Schema mapping
//!
//! Deterministic mapping from a flow record to an ECS 8.17 document, the
//! JSON payload shipped over the lumberjack protocol. String fields
//! enriched earlier in the pipeline (`source_ip`, `source_mac`, hostnames)
//! take precedence over re-deriving them from the raw byte fields.

use serde::{Deserialize, Serialize};

use flowpipe_flow::{FlowRecord, MacSeparator};

#[cfg(test)]
#[path = "ecs_test.rs"]
mod tests;

pub(crate) const ECS_VERSION: &str = "8.17";
const EVENT_PROVIDER: &str = "flowpipe";
const EVENT_MODULE: &str = "lumberjack";

/// One ECS document, ready for JSON serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsDocument {
    /// Flow start, milliseconds since the epoch.
    #[serde(rename = "@timestamp")]
    pub timestamp: u64,
    pub ecs: EcsMeta,
    pub event: EcsEvent,
    pub source: EcsEndpoint,
    pub destination: EcsEndpoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp: Option<EcsIcmp>,
    pub network: EcsNetwork,
    pub related: EcsRelated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsMeta {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsEvent {
    pub kind: String,
    pub category: Vec<String>,
    #[serde(rename = "type")]
    pub event_type: Vec<String>,
    pub outcome: String,
    /// Flow start/end in milliseconds.
    pub start: u64,
    pub end: u64,
    /// Flow duration in nanoseconds.
    pub duration: i64,
    pub provider: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsEndpoint {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,
    pub packets: u64,
    pub port: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_system: Option<EcsAutonomousSystem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcsAutonomousSystem {
    pub number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcsIcmp {
    #[serde(rename = "type")]
    pub icmp_type: u32,
    pub code: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsNetwork {
    pub iana_number: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transport: String,
    pub bytes: u64,
    pub packets: u64,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub network_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcsRelated {
    pub ip: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

impl EcsDocument {
    pub fn from_flow(flow: &FlowRecord) -> EcsDocument {
        let source_ip = preferred_ip(&flow.source_ip, flow.src_addr_ip());
        let destination_ip = preferred_ip(&flow.destination_ip, flow.dst_addr_ip());

        let source_mac = preferred_mac(&flow.source_mac, flow.src_mac, || {
            flow.src_mac_string(MacSeparator::Dash)
        });
        let destination_mac = preferred_mac(&flow.destination_mac, flow.dst_mac, || {
            flow.dst_mac_string(MacSeparator::Dash)
        });

        let icmp = match flow.proto {
            // ICMPv4 / ICMPv6 only; Elastic's community-id enrichment needs these.
            1 | 58 => Some(EcsIcmp {
                icmp_type: flow.icmp_type,
                code: flow.icmp_code,
            }),
            _ => None,
        };

        let network_type = match flow.etype {
            0x0800 => "ipv4",
            0x86DD => "ipv6",
            _ => "",
        };

        let mut hosts = Vec::new();
        if !flow.src_host_name.is_empty() {
            hosts.push(flow.src_host_name.clone());
        }
        if !flow.dst_host_name.is_empty() {
            hosts.push(flow.dst_host_name.clone());
        }

        EcsDocument {
            timestamp: flow.time_flow_start_ms,
            ecs: EcsMeta {
                version: ECS_VERSION.to_string(),
            },
            event: EcsEvent {
                kind: "event".to_string(),
                category: vec!["network".to_string()],
                event_type: vec!["connection".to_string()],
                outcome: "success".to_string(),
                start: flow.time_flow_start_ms,
                end: flow.time_flow_end_ms,
                duration: flow.time_flow_end_ns.wrapping_sub(flow.time_flow_start_ns) as i64,
                provider: EVENT_PROVIDER.to_string(),
                module: EVENT_MODULE.to_string(),
            },
            source: EcsEndpoint {
                address: source_ip.clone(),
                bytes: flow.bytes,
                ip: source_ip.clone(),
                mac: source_mac,
                packets: flow.packets,
                port: flow.src_port,
                autonomous_system: autonomous_system(flow.src_as),
            },
            destination: EcsEndpoint {
                address: destination_ip.clone(),
                // Flows are unidirectional; the reverse direction is its own flow.
                bytes: 0,
                ip: destination_ip.clone(),
                mac: destination_mac,
                packets: 0,
                port: flow.dst_port,
                autonomous_system: autonomous_system(flow.dst_as),
            },
            icmp,
            network: EcsNetwork {
                iana_number: flow.proto,
                transport: flowpipe_flow::iana::protocol_name_lowercase(flow.proto),
                bytes: flow.bytes,
                packets: flow.packets,
                network_type: network_type.to_string(),
            },
            related: EcsRelated {
                ip: vec![source_ip, destination_ip],
                hosts,
            },
        }
    }
}

fn preferred_ip(enriched: &str, raw: Option<std::net::IpAddr>) -> String {
    if !enriched.is_empty() {
        return enriched.to_string();
    }
    raw.map(|ip| ip.to_string()).unwrap_or_default()
}

fn preferred_mac(enriched: &str, packed: u64, derive: impl Fn() -> String) -> String {
    if packed == 0 {
        return String::new();
    }
    if !enriched.is_empty() {
        return enriched.to_string();
    }
    derive()
}

fn autonomous_system(number: u32) -> Option<EcsAutonomousSystem> {
    (number != 0).then_some(EcsAutonomousSystem { number })
}
