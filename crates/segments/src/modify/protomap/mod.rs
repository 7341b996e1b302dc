//! Protomap segment - protocol name resolution
//!
//! Sets the `proto_name` field from the IANA protocol-numbers table.
//! Unassigned numbers (and anything above 255) map to `"UNKNOWN"`. Best
//! placed late in a pipeline: carrying the extra string through many
//! segments costs memory and serialization size.

use async_trait::async_trait;

use flowpipe_flow::iana;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, Result, Segment, SegmentConfig, SegmentFactory, SegmentIo,
};

#[cfg(test)]
#[path = "protomap_test.rs"]
mod tests;

#[derive(Debug)]
pub struct Protomap {
    io: SegmentIo,
}

pub struct ProtomapFactory;

impl SegmentFactory for ProtomapFactory {
    fn name(&self) -> &'static str {
        "protomap"
    }

    fn create(&self, _config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        Ok(Box::new(Protomap {
            io: SegmentIo::default(),
        }))
    }
}

#[async_trait]
impl Segment for Protomap {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(mut flow) = input.recv().await {
            let name = iana::protocol_name(flow.proto);
            flow.proto_name = if name.is_empty() {
                "UNKNOWN".to_string()
            } else {
                name.to_string()
            };
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
