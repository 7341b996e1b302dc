//! Dropfields segment - field whitelisting/blacklisting
//!
//! Zeroes flow record fields according to a policy:
//!
//! - `policy: drop` zeroes exactly the configured fields
//! - `policy: keep` zeroes everything except the configured fields
//!
//! Options: `policy` (required) and `fields`, a comma-separated list of
//! field names (`SrcAddr` and `src_addr` spellings both work). An unknown
//! field name aborts the pipeline build.

use async_trait::async_trait;

use flowpipe_flow::Field;
use flowpipe_pipeline::{
    FlowReceiver, FlowSender, PipelineError, Result, Segment, SegmentConfig, SegmentFactory,
    SegmentIo,
};

#[cfg(test)]
#[path = "dropfields_test.rs"]
mod tests;

const SEGMENT_NAME: &str = "dropfields";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    Keep,
    Drop,
}

#[derive(Debug)]
pub struct DropFields {
    io: SegmentIo,
    policy: Policy,
    fields: Vec<Field>,
}

pub struct DropFieldsFactory;

impl SegmentFactory for DropFieldsFactory {
    fn name(&self) -> &'static str {
        SEGMENT_NAME
    }

    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let policy = match config.require(SEGMENT_NAME, "policy")? {
            "keep" => Policy::Keep,
            "drop" => Policy::Drop,
            other => {
                return Err(PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "policy",
                    format!("'{other}' is neither 'keep' nor 'drop'"),
                ))
            }
        };

        let mut fields = Vec::new();
        for name in config.require(SEGMENT_NAME, "fields")?.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let field = Field::parse(name).ok_or_else(|| {
                PipelineError::invalid_option(
                    SEGMENT_NAME,
                    "fields",
                    format!("unknown field '{name}'"),
                )
            })?;
            fields.push(field);
        }
        if fields.is_empty() {
            return Err(PipelineError::invalid_option(
                SEGMENT_NAME,
                "fields",
                "no fields given",
            ));
        }

        Ok(Box::new(DropFields {
            io: SegmentIo::default(),
            policy,
            fields,
        }))
    }
}

#[async_trait]
impl Segment for DropFields {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();
        while let Some(mut flow) = input.recv().await {
            match self.policy {
                Policy::Drop => {
                    for field in &self.fields {
                        flow.clear(*field);
                    }
                }
                Policy::Keep => {
                    for field in Field::ALL {
                        if !self.fields.contains(field) {
                            flow.clear(*field);
                        }
                    }
                }
            }
            if output.send(flow).await.is_err() {
                break;
            }
        }
    }
}
