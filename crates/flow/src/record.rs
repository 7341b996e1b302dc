//! Flow record - the unit of work traversing the pipeline
//!
//! Segments receive records by value, may read and write any field, and hand
//! them on. Once a record has been sent downstream it must not be touched
//! again; a segment that also needs the record afterwards (e.g. an exporter
//! that forwards and ships) clones before sending.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;

/// Separator used when rendering a packed MAC address as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MacSeparator {
    /// `aa:bb:cc:dd:ee:ff` (default)
    #[default]
    Colon,
    /// `aa-bb-cc-dd-ee-ff` (ECS form)
    Dash,
}

impl MacSeparator {
    fn as_str(self) -> &'static str {
        match self {
            MacSeparator::Colon => ":",
            MacSeparator::Dash => "-",
        }
    }
}

/// One unit of network telemetry.
///
/// Addresses are raw byte sequences (4 bytes for IPv4, 16 for IPv6, empty
/// when unset). MAC addresses are packed into a `u64` in little-endian byte
/// order with the two high bytes zero. The `*_ip` / `*_mac` / `*_host_name`
/// string fields start empty and are populated by enrichment segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowRecord {
    pub src_addr: Vec<u8>,
    pub dst_addr: Vec<u8>,
    pub next_hop: Vec<u8>,
    pub sampler_address: Vec<u8>,

    pub src_port: u32,
    pub dst_port: u32,
    pub proto: u32,
    pub etype: u32,

    pub bytes: u64,
    pub packets: u64,

    pub time_flow_start_ms: u64,
    pub time_flow_end_ms: u64,
    pub time_flow_start_ns: u64,
    pub time_flow_end_ns: u64,

    pub in_if: u32,
    pub out_if: u32,
    pub src_as: u32,
    pub dst_as: u32,

    pub src_mac: u64,
    pub dst_mac: u64,

    pub icmp_type: u32,
    pub icmp_code: u32,

    // Enrichment fields, filled in by upstream segments.
    pub source_ip: String,
    pub destination_ip: String,
    pub next_hop_ip: String,
    pub sampler_ip: String,
    pub source_mac: String,
    pub destination_mac: String,
    pub proto_name: String,
    pub src_host_name: String,
    pub dst_host_name: String,
    pub next_hop_host_name: String,
    pub sampler_host_name: String,
}

impl FlowRecord {
    /// Source address as an [`IpAddr`], if the raw bytes are 4 or 16 long.
    pub fn src_addr_ip(&self) -> Option<IpAddr> {
        addr_from_bytes(&self.src_addr)
    }

    /// Destination address as an [`IpAddr`].
    pub fn dst_addr_ip(&self) -> Option<IpAddr> {
        addr_from_bytes(&self.dst_addr)
    }

    /// Next-hop address as an [`IpAddr`].
    pub fn next_hop_addr_ip(&self) -> Option<IpAddr> {
        addr_from_bytes(&self.next_hop)
    }

    /// Sampler (exporter) address as an [`IpAddr`].
    pub fn sampler_addr_ip(&self) -> Option<IpAddr> {
        addr_from_bytes(&self.sampler_address)
    }

    /// Source MAC rendered as six two-hex-digit lowercase groups.
    pub fn src_mac_string(&self, separator: MacSeparator) -> String {
        mac_string(self.src_mac, separator)
    }

    /// Destination MAC rendered as six two-hex-digit lowercase groups.
    pub fn dst_mac_string(&self, separator: MacSeparator) -> String {
        mac_string(self.dst_mac, separator)
    }

    /// Reset a single field to its zero value.
    pub fn clear(&mut self, field: Field) {
        match field {
            Field::SrcAddr => self.src_addr.clear(),
            Field::DstAddr => self.dst_addr.clear(),
            Field::NextHop => self.next_hop.clear(),
            Field::SamplerAddress => self.sampler_address.clear(),
            Field::SrcPort => self.src_port = 0,
            Field::DstPort => self.dst_port = 0,
            Field::Proto => self.proto = 0,
            Field::Etype => self.etype = 0,
            Field::Bytes => self.bytes = 0,
            Field::Packets => self.packets = 0,
            Field::TimeFlowStartMs => self.time_flow_start_ms = 0,
            Field::TimeFlowEndMs => self.time_flow_end_ms = 0,
            Field::TimeFlowStartNs => self.time_flow_start_ns = 0,
            Field::TimeFlowEndNs => self.time_flow_end_ns = 0,
            Field::InIf => self.in_if = 0,
            Field::OutIf => self.out_if = 0,
            Field::SrcAs => self.src_as = 0,
            Field::DstAs => self.dst_as = 0,
            Field::SrcMac => self.src_mac = 0,
            Field::DstMac => self.dst_mac = 0,
            Field::IcmpType => self.icmp_type = 0,
            Field::IcmpCode => self.icmp_code = 0,
            Field::SourceIp => self.source_ip.clear(),
            Field::DestinationIp => self.destination_ip.clear(),
            Field::NextHopIp => self.next_hop_ip.clear(),
            Field::SamplerIp => self.sampler_ip.clear(),
            Field::SourceMac => self.source_mac.clear(),
            Field::DestinationMac => self.destination_mac.clear(),
            Field::ProtoName => self.proto_name.clear(),
            Field::SrcHostName => self.src_host_name.clear(),
            Field::DstHostName => self.dst_host_name.clear(),
            Field::NextHopHostName => self.next_hop_host_name.clear(),
            Field::SamplerHostName => self.sampler_host_name.clear(),
        }
    }
}

/// A named [`FlowRecord`] field, as referenced by segment configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SrcAddr,
    DstAddr,
    NextHop,
    SamplerAddress,
    SrcPort,
    DstPort,
    Proto,
    Etype,
    Bytes,
    Packets,
    TimeFlowStartMs,
    TimeFlowEndMs,
    TimeFlowStartNs,
    TimeFlowEndNs,
    InIf,
    OutIf,
    SrcAs,
    DstAs,
    SrcMac,
    DstMac,
    IcmpType,
    IcmpCode,
    SourceIp,
    DestinationIp,
    NextHopIp,
    SamplerIp,
    SourceMac,
    DestinationMac,
    ProtoName,
    SrcHostName,
    DstHostName,
    NextHopHostName,
    SamplerHostName,
}

impl Field {
    /// Every known field, in declaration order.
    pub const ALL: &'static [Field] = &[
        Field::SrcAddr,
        Field::DstAddr,
        Field::NextHop,
        Field::SamplerAddress,
        Field::SrcPort,
        Field::DstPort,
        Field::Proto,
        Field::Etype,
        Field::Bytes,
        Field::Packets,
        Field::TimeFlowStartMs,
        Field::TimeFlowEndMs,
        Field::TimeFlowStartNs,
        Field::TimeFlowEndNs,
        Field::InIf,
        Field::OutIf,
        Field::SrcAs,
        Field::DstAs,
        Field::SrcMac,
        Field::DstMac,
        Field::IcmpType,
        Field::IcmpCode,
        Field::SourceIp,
        Field::DestinationIp,
        Field::NextHopIp,
        Field::SamplerIp,
        Field::SourceMac,
        Field::DestinationMac,
        Field::ProtoName,
        Field::SrcHostName,
        Field::DstHostName,
        Field::NextHopHostName,
        Field::SamplerHostName,
    ];

    /// Resolve a configured field name.
    ///
    /// Matching is case-insensitive and ignores underscores and dashes, so
    /// both `SrcAddr` and `src_addr` resolve to [`Field::SrcAddr`].
    pub fn parse(name: &str) -> Option<Field> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let field = match normalized.as_str() {
            "srcaddr" => Field::SrcAddr,
            "dstaddr" => Field::DstAddr,
            "nexthop" => Field::NextHop,
            "sampleraddress" => Field::SamplerAddress,
            "srcport" => Field::SrcPort,
            "dstport" => Field::DstPort,
            "proto" => Field::Proto,
            "etype" => Field::Etype,
            "bytes" => Field::Bytes,
            "packets" => Field::Packets,
            "timeflowstartms" => Field::TimeFlowStartMs,
            "timeflowendms" => Field::TimeFlowEndMs,
            "timeflowstartns" => Field::TimeFlowStartNs,
            "timeflowendns" => Field::TimeFlowEndNs,
            "inif" => Field::InIf,
            "outif" => Field::OutIf,
            "srcas" => Field::SrcAs,
            "dstas" => Field::DstAs,
            "srcmac" => Field::SrcMac,
            "dstmac" => Field::DstMac,
            "icmptype" => Field::IcmpType,
            "icmpcode" => Field::IcmpCode,
            "sourceip" => Field::SourceIp,
            "destinationip" => Field::DestinationIp,
            "nexthopip" => Field::NextHopIp,
            "samplerip" => Field::SamplerIp,
            "sourcemac" => Field::SourceMac,
            "destinationmac" => Field::DestinationMac,
            "protoname" => Field::ProtoName,
            "srchostname" => Field::SrcHostName,
            "dsthostname" => Field::DstHostName,
            "nexthophostname" => Field::NextHopHostName,
            "samplerhostname" => Field::SamplerHostName,
            _ => return None,
        };
        Some(field)
    }
}

fn addr_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::from(octets))
        }
        _ => None,
    }
}

fn mac_string(mac: u64, separator: MacSeparator) -> String {
    let bytes = mac.to_le_bytes();
    bytes[..6]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(separator.as_str())
}
