//! Pipeline builder
//!
//! Turns the declarative segment list into a wired [`Pipeline`]: looks up
//! each prototype in the registry, instantiates it, and connects neighbors
//! with capacity-1 channels. `branch` entries are recognized structurally
//! and get their `then`/`else` sub-pipelines built recursively.

use tokio::sync::mpsc;

use flowpipe_flow::FlowPredicate;

use crate::branch::{BranchSegment, Passthrough};
use crate::config::SegmentEntry;
use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::registry::SegmentRegistry;
use crate::segment::Segment;
use crate::SEGMENT_CHANNEL_CAPACITY;

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;

/// Name of the control-flow entry handled by the builder itself.
const BRANCH_SEGMENT: &str = "branch";

/// Builds pipelines against a segment registry.
pub struct PipelineBuilder<'a> {
    registry: &'a SegmentRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(registry: &'a SegmentRegistry) -> Self {
        Self { registry }
    }

    /// Instantiate and wire the configured segments.
    ///
    /// # Errors
    ///
    /// The whole build aborts on the first configuration error: unknown
    /// segment name, factory rejection, or a malformed branch entry.
    pub fn build(&self, entries: &[SegmentEntry]) -> Result<Pipeline> {
        if entries.is_empty() {
            return Err(PipelineError::Config("pipeline has no segments".into()));
        }

        let mut segments: Vec<(String, Box<dyn Segment>)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let segment = if entry.segment == BRANCH_SEGMENT {
                self.build_branch(entry)?
            } else {
                if !entry.then_branch.is_empty() || !entry.else_branch.is_empty() {
                    return Err(PipelineError::Config(format!(
                        "segment '{}' does not accept then/else lists",
                        entry.segment
                    )));
                }
                self.registry.create(&entry.segment, &entry.config)?
            };
            segments.push((entry.segment.clone(), segment));
        }

        Ok(assemble(segments))
    }

    fn build_branch(&self, entry: &SegmentEntry) -> Result<Box<dyn Segment>> {
        let expression = entry.config.require(BRANCH_SEGMENT, "condition")?;
        let condition = FlowPredicate::parse(expression).map_err(|e| {
            PipelineError::invalid_option(BRANCH_SEGMENT, "condition", e.to_string())
        })?;

        if entry.then_branch.is_empty() && entry.else_branch.is_empty() {
            return Err(PipelineError::Config(
                "branch needs at least one of then/else".into(),
            ));
        }

        let then_pipeline = self.build_arm(&entry.then_branch)?;
        let else_pipeline = self.build_arm(&entry.else_branch)?;
        Ok(Box::new(BranchSegment::new(
            condition,
            then_pipeline,
            else_pipeline,
        )))
    }

    /// An omitted arm behaves as a plain passthrough.
    fn build_arm(&self, entries: &[SegmentEntry]) -> Result<Pipeline> {
        if entries.is_empty() {
            return Ok(assemble(vec![(
                "pass".to_string(),
                Box::new(Passthrough::default()) as Box<dyn Segment>,
            )]));
        }
        self.build(entries)
    }
}

/// Wire instantiated segments with capacity-1 channels, keeping the first
/// input sender as ingress and the last output receiver as egress.
fn assemble(mut segments: Vec<(String, Box<dyn Segment>)>) -> Pipeline {
    let (ingress, mut upstream) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
    for (_, segment) in segments.iter_mut() {
        let (tx, rx) = mpsc::channel(SEGMENT_CHANNEL_CAPACITY);
        segment.rewire(upstream, tx);
        upstream = rx;
    }
    Pipeline::new(segments, ingress, upstream)
}
