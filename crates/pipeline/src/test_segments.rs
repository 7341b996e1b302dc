//! Toy segments used by the pipeline crate's own tests

use async_trait::async_trait;

use crate::config::SegmentConfig;
use crate::error::Result;
use crate::segment::{FlowReceiver, FlowSender, Segment, SegmentFactory, SegmentIo};

/// Adds a fixed amount to every record's byte counter.
#[derive(Debug)]
pub(crate) struct AddBytes {
    io: SegmentIo,
    amount: u64,
}

pub(crate) struct AddBytesFactory;

impl SegmentFactory for AddBytesFactory {
    fn name(&self) -> &'static str {
        "addbytes"
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let amount = config.get_u64("addbytes", "amount")?.unwrap_or(1);
        Ok(Box::new(AddBytes {
            io: SegmentIo::default(),
            amount,
        }))
    }
}

#[async_trait]
impl Segment for AddBytes {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(mut flow) = input.recv().await {
            flow.bytes += self.amount;
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}

/// Stamps every record's protocol name with a configured value.
#[derive(Debug)]
pub(crate) struct Tag {
    io: SegmentIo,
    value: String,
}

pub(crate) struct TagFactory;

impl SegmentFactory for TagFactory {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let value = config.get("value").unwrap_or("tagged").to_string();
        Ok(Box::new(Tag {
            io: SegmentIo::default(),
            value,
        }))
    }
}

#[async_trait]
impl Segment for Tag {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(mut flow) = input.recv().await {
            flow.proto_name = self.value.clone();
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
