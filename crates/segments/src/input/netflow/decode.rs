//! NetFlow v5/v9 and IPFIX datagram decoding
//!
//! v9 and IPFIX are template based: data records can only be decoded once
//! the exporter has announced the matching template, so the decoder keeps a
//! template cache keyed by (exporter address, observation domain, template
//! id). Data sets arriving before their template are skipped and counted,
//! not treated as errors - the exporter re-announces templates periodically.
//!
//! Timestamps are normalized to absolute milliseconds: v5/v9 carry
//! sysuptime-relative switch times plus the export wall clock, IPFIX mostly
//! carries absolute fields (150-153). Records without any timestamp fall
//! back to the export time.

use std::collections::HashMap;
use std::net::IpAddr;

use thiserror::Error;

use flowpipe_flow::FlowRecord;

#[cfg(test)]
#[path = "decode_test.rs"]
mod tests;

pub(crate) const ETYPE_IPV4: u32 = 0x0800;
pub(crate) const ETYPE_IPV6: u32 = 0x86DD;

/// Errors for datagrams that cannot be decoded at all.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("datagram too short ({0} bytes)")]
    Truncated(usize),

    #[error("unsupported flow export version {0}")]
    UnsupportedVersion(u16),

    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

type TemplateKey = (IpAddr, u32, u16);

#[derive(Debug, Clone, Copy)]
struct TemplateField {
    field_type: u16,
    length: usize,
    enterprise: bool,
}

#[derive(Debug, Clone)]
struct Template {
    fields: Vec<TemplateField>,
    record_len: usize,
}

struct DecodeContext {
    /// Exporter boot wall-clock in ms; basis for sysuptime-relative fields.
    /// Absent for IPFIX, which has no sysuptime in the header.
    boot_ms: Option<u64>,
    /// Export wall-clock in ms; timestamp of last resort.
    export_ms: u64,
}

/// Stateful flow datagram decoder (one per socket).
pub struct Decoder {
    templates: HashMap<TemplateKey, Template>,
    unresolved_sets: u64,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
            unresolved_sets: 0,
        }
    }

    /// Data sets skipped because their template has not been seen yet.
    pub fn unresolved_sets(&self) -> u64 {
        self.unresolved_sets
    }

    /// Decode one datagram into flow records.
    pub fn decode(
        &mut self,
        datagram: &[u8],
        exporter: IpAddr,
    ) -> Result<Vec<FlowRecord>, DecodeError> {
        if datagram.len() < 2 {
            return Err(DecodeError::Truncated(datagram.len()));
        }
        match be16(&datagram[0..2]) {
            5 => self.decode_v5(datagram, exporter),
            9 => self.decode_v9(datagram, exporter),
            10 => self.decode_ipfix(datagram, exporter),
            other => Err(DecodeError::UnsupportedVersion(other)),
        }
    }

    fn decode_v5(
        &mut self,
        datagram: &[u8],
        exporter: IpAddr,
    ) -> Result<Vec<FlowRecord>, DecodeError> {
        const HEADER_LEN: usize = 24;
        const RECORD_LEN: usize = 48;

        if datagram.len() < HEADER_LEN {
            return Err(DecodeError::Truncated(datagram.len()));
        }
        let count = be16(&datagram[2..4]) as usize;
        let sys_uptime = be32(&datagram[4..8]) as u64;
        let unix_secs = be32(&datagram[8..12]) as u64;
        let unix_nsecs = be32(&datagram[12..16]) as u64;
        let boot_ms = (unix_secs * 1000 + unix_nsecs / 1_000_000).saturating_sub(sys_uptime);

        let mut flows = Vec::with_capacity(count);
        let mut offset = HEADER_LEN;
        for _ in 0..count {
            let record = datagram
                .get(offset..offset + RECORD_LEN)
                .ok_or(DecodeError::Malformed("record count exceeds datagram"))?;

            let mut flow = FlowRecord {
                src_addr: record[0..4].to_vec(),
                dst_addr: record[4..8].to_vec(),
                next_hop: record[8..12].to_vec(),
                in_if: be16(&record[12..14]) as u32,
                out_if: be16(&record[14..16]) as u32,
                packets: be32(&record[16..20]) as u64,
                bytes: be32(&record[20..24]) as u64,
                src_port: be16(&record[32..34]) as u32,
                dst_port: be16(&record[34..36]) as u32,
                proto: record[38] as u32,
                src_as: be16(&record[40..42]) as u32,
                dst_as: be16(&record[42..44]) as u32,
                etype: ETYPE_IPV4,
                sampler_address: ip_bytes(exporter),
                ..Default::default()
            };
            let first = be32(&record[24..28]) as u64;
            let last = be32(&record[28..32]) as u64;
            set_times(&mut flow, boot_ms + first, boot_ms + last);

            flows.push(flow);
            offset += RECORD_LEN;
        }
        Ok(flows)
    }

    fn decode_v9(
        &mut self,
        datagram: &[u8],
        exporter: IpAddr,
    ) -> Result<Vec<FlowRecord>, DecodeError> {
        const HEADER_LEN: usize = 20;

        if datagram.len() < HEADER_LEN {
            return Err(DecodeError::Truncated(datagram.len()));
        }
        let sys_uptime = be32(&datagram[4..8]) as u64;
        let unix_secs = be32(&datagram[8..12]) as u64;
        let source_id = be32(&datagram[16..20]);
        let context = DecodeContext {
            boot_ms: Some((unix_secs * 1000).saturating_sub(sys_uptime)),
            export_ms: unix_secs * 1000,
        };

        self.decode_sets(
            &datagram[HEADER_LEN..],
            exporter,
            source_id,
            &context,
            false,
        )
    }

    fn decode_ipfix(
        &mut self,
        datagram: &[u8],
        exporter: IpAddr,
    ) -> Result<Vec<FlowRecord>, DecodeError> {
        const HEADER_LEN: usize = 16;

        if datagram.len() < HEADER_LEN {
            return Err(DecodeError::Truncated(datagram.len()));
        }
        let export_secs = be32(&datagram[4..8]) as u64;
        let domain_id = be32(&datagram[12..16]);
        let context = DecodeContext {
            boot_ms: None,
            export_ms: export_secs * 1000,
        };

        self.decode_sets(&datagram[HEADER_LEN..], exporter, domain_id, &context, true)
    }

    fn decode_sets(
        &mut self,
        mut body: &[u8],
        exporter: IpAddr,
        source_id: u32,
        context: &DecodeContext,
        ipfix: bool,
    ) -> Result<Vec<FlowRecord>, DecodeError> {
        let template_set_id = if ipfix { 2 } else { 0 };
        let mut flows = Vec::new();

        while body.len() >= 4 {
            let set_id = be16(&body[0..2]);
            let set_len = be16(&body[2..4]) as usize;
            if set_len < 4 {
                return Err(DecodeError::Malformed("set length under 4"));
            }
            let set_body = body
                .get(4..set_len)
                .ok_or(DecodeError::Malformed("set exceeds datagram"))?;

            if set_id == template_set_id {
                self.parse_templates(set_body, exporter, source_id, ipfix)?;
            } else if set_id >= 256 {
                self.decode_data_set(set_body, exporter, source_id, set_id, context, &mut flows);
            }
            // Options template sets (1 / 3) carry exporter statistics this
            // pipeline does not consume.

            body = &body[set_len..];
        }
        Ok(flows)
    }

    fn parse_templates(
        &mut self,
        body: &[u8],
        exporter: IpAddr,
        source_id: u32,
        ipfix: bool,
    ) -> Result<(), DecodeError> {
        let mut offset = 0;
        while offset + 4 <= body.len() {
            let template_id = be16(&body[offset..offset + 2]);
            let field_count = be16(&body[offset + 2..offset + 4]) as usize;
            offset += 4;
            if template_id == 0 && field_count == 0 {
                break; // padding
            }

            let mut fields = Vec::with_capacity(field_count);
            let mut record_len = 0usize;
            for _ in 0..field_count {
                let header = body
                    .get(offset..offset + 4)
                    .ok_or(DecodeError::Malformed("template truncated"))?;
                let mut field_type = be16(&header[0..2]);
                let length = be16(&header[2..4]) as usize;
                offset += 4;

                let enterprise = ipfix && field_type & 0x8000 != 0;
                if enterprise {
                    field_type &= 0x7fff;
                    // Skip the enterprise number; the field itself is kept
                    // for its length but never interpreted.
                    if offset + 4 > body.len() {
                        return Err(DecodeError::Malformed("template truncated"));
                    }
                    offset += 4;
                }
                if length == 0xffff {
                    return Err(DecodeError::Malformed("variable-length field unsupported"));
                }
                record_len += length;
                fields.push(TemplateField {
                    field_type,
                    length,
                    enterprise,
                });
            }
            if record_len == 0 {
                return Err(DecodeError::Malformed("empty template"));
            }
            self.templates.insert(
                (exporter, source_id, template_id),
                Template { fields, record_len },
            );
        }
        Ok(())
    }

    fn decode_data_set(
        &mut self,
        body: &[u8],
        exporter: IpAddr,
        source_id: u32,
        set_id: u16,
        context: &DecodeContext,
        flows: &mut Vec<FlowRecord>,
    ) {
        let Some(template) = self.templates.get(&(exporter, source_id, set_id)) else {
            self.unresolved_sets += 1;
            return;
        };

        let mut offset = 0;
        // Trailing bytes shorter than one record are set padding.
        while offset + template.record_len <= body.len() {
            let record = &body[offset..offset + template.record_len];
            flows.push(decode_record(template, record, exporter, context));
            offset += template.record_len;
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_record(
    template: &Template,
    record: &[u8],
    exporter: IpAddr,
    context: &DecodeContext,
) -> FlowRecord {
    let mut flow = FlowRecord::default();
    let mut first_uptime = None;
    let mut last_uptime = None;
    let mut start_ms = 0u64;
    let mut end_ms = 0u64;

    let mut offset = 0;
    for field in &template.fields {
        let data = &record[offset..offset + field.length];
        offset += field.length;
        if field.enterprise {
            continue;
        }
        match field.field_type {
            1 => flow.bytes = be_uint(data),
            2 => flow.packets = be_uint(data),
            4 => flow.proto = be_uint(data) as u32,
            7 => flow.src_port = be_uint(data) as u32,
            8 => {
                flow.src_addr = data.to_vec();
                flow.etype = ETYPE_IPV4;
            }
            10 => flow.in_if = be_uint(data) as u32,
            11 => flow.dst_port = be_uint(data) as u32,
            12 => {
                flow.dst_addr = data.to_vec();
                flow.etype = ETYPE_IPV4;
            }
            14 => flow.out_if = be_uint(data) as u32,
            15 | 62 => flow.next_hop = data.to_vec(),
            16 => flow.src_as = be_uint(data) as u32,
            17 => flow.dst_as = be_uint(data) as u32,
            21 => last_uptime = Some(be_uint(data)),
            22 => first_uptime = Some(be_uint(data)),
            27 => {
                flow.src_addr = data.to_vec();
                flow.etype = ETYPE_IPV6;
            }
            28 => {
                flow.dst_addr = data.to_vec();
                flow.etype = ETYPE_IPV6;
            }
            32 => {
                // ICMP_TYPE carries type * 256 + code.
                let combined = be_uint(data) as u32;
                flow.icmp_type = combined >> 8;
                flow.icmp_code = combined & 0xff;
            }
            56 => flow.src_mac = mac_from_bytes(data),
            80 => flow.dst_mac = mac_from_bytes(data),
            150 => start_ms = be_uint(data).saturating_mul(1000),
            151 => end_ms = be_uint(data).saturating_mul(1000),
            152 => start_ms = be_uint(data),
            153 => end_ms = be_uint(data),
            _ => {}
        }
    }

    let start = resolve_time(start_ms, first_uptime, context);
    let end = resolve_time(end_ms, last_uptime, context);
    set_times(&mut flow, start, end);
    flow.sampler_address = ip_bytes(exporter);
    flow
}

fn resolve_time(absolute_ms: u64, uptime_ms: Option<u64>, context: &DecodeContext) -> u64 {
    if absolute_ms != 0 {
        return absolute_ms;
    }
    match (uptime_ms, context.boot_ms) {
        (Some(uptime), Some(boot)) => boot + uptime,
        _ => context.export_ms,
    }
}

fn set_times(flow: &mut FlowRecord, start_ms: u64, end_ms: u64) {
    flow.time_flow_start_ms = start_ms;
    flow.time_flow_end_ms = end_ms;
    flow.time_flow_start_ns = start_ms.saturating_mul(1_000_000);
    flow.time_flow_end_ns = end_ms.saturating_mul(1_000_000);
}

fn ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Pack a wire-order MAC (first octet first) little-endian, high bytes zero.
fn mac_from_bytes(data: &[u8]) -> u64 {
    let mut packed = [0u8; 8];
    for (i, byte) in data.iter().take(6).enumerate() {
        packed[i] = *byte;
    }
    u64::from_le_bytes(packed)
}

fn be16(data: &[u8]) -> u16 {
    u16::from_be_bytes([data[0], data[1]])
}

fn be32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Big-endian unsigned integer of 1..=8 bytes.
fn be_uint(data: &[u8]) -> u64 {
    data.iter()
        .take(8)
        .fold(0u64, |acc, byte| (acc << 8) | *byte as u64)
}
