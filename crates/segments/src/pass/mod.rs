//! Pass segment - forwards every record unchanged
//!
//! Useful as a placeholder in configs and as the minimal segment for
//! pipeline tests.

use async_trait::async_trait;

use flowpipe_pipeline::{
    FlowReceiver, FlowSender, Result, Segment, SegmentConfig, SegmentFactory, SegmentIo,
};

#[cfg(test)]
#[path = "pass_test.rs"]
mod tests;

#[derive(Debug)]
pub struct Pass {
    io: SegmentIo,
}

pub struct PassFactory;

impl SegmentFactory for PassFactory {
    fn name(&self) -> &'static str {
        "pass"
    }

    fn create(&self, _config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        Ok(Box::new(Pass {
            io: SegmentIo::default(),
        }))
    }
}

#[async_trait]
impl Segment for Pass {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(flow) = input.recv().await {
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
