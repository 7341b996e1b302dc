//! Addrstrings segment - human-readable address forms
//!
//! Populates the string representations of the raw address and MAC fields
//! that are set:
//!
//! - `source_ip` (from `src_addr`), `destination_ip` (from `dst_addr`),
//!   `next_hop_ip` (from `next_hop`), `sampler_ip` (from `sampler_address`)
//! - `source_mac` (from `src_mac`), `destination_mac` (from `dst_mac`)
//!
//! The single option `macseparator` switches MAC formatting to dashes when
//! it contains `dash`; colons are the default.
//!
//! Intended to be combined with `dropfields` to shed the raw fields
//! afterwards.

use async_trait::async_trait;

use flowpipe_flow::MacSeparator;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, Result, Segment, SegmentConfig, SegmentFactory, SegmentIo,
};

#[cfg(test)]
#[path = "addrstrings_test.rs"]
mod tests;

#[derive(Debug)]
pub struct AddrStrings {
    io: SegmentIo,
    separator: MacSeparator,
}

pub struct AddrStringsFactory;

impl SegmentFactory for AddrStringsFactory {
    fn name(&self) -> &'static str {
        "addrstrings"
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let separator = match config.get("macseparator") {
            Some(value) if value.contains("dash") => MacSeparator::Dash,
            _ => MacSeparator::Colon,
        };
        Ok(Box::new(AddrStrings {
            io: SegmentIo::default(),
            separator,
        }))
    }
}

#[async_trait]
impl Segment for AddrStrings {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(mut flow) = input.recv().await {
            if let Some(ip) = flow.src_addr_ip() {
                flow.source_ip = ip.to_string();
            }
            if let Some(ip) = flow.dst_addr_ip() {
                flow.destination_ip = ip.to_string();
            }
            if let Some(ip) = flow.next_hop_addr_ip() {
                flow.next_hop_ip = ip.to_string();
            }
            if let Some(ip) = flow.sampler_addr_ip() {
                flow.sampler_ip = ip.to_string();
            }
            if flow.src_mac != 0 {
                flow.source_mac = flow.src_mac_string(self.separator);
            }
            if flow.dst_mac != 0 {
                flow.destination_mac = flow.dst_mac_string(self.separator);
            }
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
