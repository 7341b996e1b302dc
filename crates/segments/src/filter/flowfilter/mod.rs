//! Flowfilter segment - predicate admission filter
//!
//! Forwards only records matching the expression in the `filter` option
//! (see `flowpipe_flow::filter` for the grammar). A syntax error in the
//! expression aborts the pipeline build.

use async_trait::async_trait;

use flowpipe_flow::FlowPredicate;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

#[cfg(test)]
#[path = "flowfilter_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "flowfilter";

#[derive(Debug)]
pub struct FlowFilter {
    io: SegmentIo,
    predicate: FlowPredicate,
}

pub struct FlowFilterFactory;

impl SegmentFactory for FlowFilterFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let expression = config.require(SEGMENT_NAME, "filter")?;
        let predicate = FlowPredicate::parse(expression)
            .map_err(|e| PipelineError::invalid_option(SEGMENT_NAME, "filter", e.to_string()))?;
        Ok(Box::new(FlowFilter {
            io: SegmentIo::default(),
            predicate,
        }))
    }
}

#[async_trait]
impl Segment for FlowFilter {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(flow) = input.recv().await {
            if !self.predicate.matches(&flow) {
                continue;
            }
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
