//! Drop segment - swallows every record
//!
//! Emits nothing. Mostly useful as a branch arm to discard one side of a
//! split stream.

use async_trait::async_trait;

use flowpipe_pipeline::{
    FlowReceiver, FlowSender, Result, Segment, SegmentConfig, SegmentFactory, SegmentIo,
};

#[cfg(test)]
#[path = "drop_test.rs"]
mod tests;

#[derive(Debug)]
pub struct DropAll {
    io: SegmentIo,
}

pub struct DropFactory;

impl SegmentFactory for DropFactory {
    fn name(&self) -> &'static str {
        "drop"
    }

    fn create(&self, _config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        Ok(Box::new(DropAll {
            io: SegmentIo::default(),
        }))
    }
}

#[async_trait]
impl Segment for DropAll {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, _output) = self.io.take();
        while input.recv().await.is_some() {}
    }
}
