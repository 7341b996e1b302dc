//! Pipeline runtime
//!
//! The assembled graph: instantiated segments, the channels connecting them,
//! and the shared completion barrier.
//!
//! # Termination protocol
//!
//! There is exactly one way to stop a pipeline: [`Pipeline::close`] drops
//! the ingress sender. The first segment observes channel closure, flushes,
//! and returns from `run`, dropping its own output sender; the wave
//! propagates downstream until the terminal drain exits. `close` then
//! resolves the barrier and returns. No cancellation signal is ever
//! delivered to segments.

use tokio_util::task::TaskTracker;

use flowpipe_flow::FlowRecord;

use crate::builder::PipelineBuilder;
use crate::config::parse_config;
use crate::error::Result;
use crate::registry::SegmentRegistry;
use crate::segment::{FlowReceiver, FlowSender, Segment};

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// An assembled, runnable pipeline.
pub struct Pipeline {
    segments: Vec<(String, Box<dyn Segment>)>,
    ingress: Option<FlowSender>,
    egress: Option<FlowReceiver>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("segments", &self.segments)
            .field("ingress", &self.ingress)
            .field("egress", &self.egress)
            .finish()
    }
}

impl Pipeline {
    pub(crate) fn new(
        segments: Vec<(String, Box<dyn Segment>)>,
        ingress: FlowSender,
        egress: FlowReceiver,
    ) -> Self {
        Self {
            segments,
            ingress: Some(ingress),
            egress: Some(egress),
            tracker: TaskTracker::new(),
        }
    }

    /// Parse a YAML pipeline definition and build it against a registry.
    pub fn from_config(registry: &SegmentRegistry, yaml: &str) -> Result<Pipeline> {
        let entries = parse_config(yaml)?;
        PipelineBuilder::new(registry).build(&entries)
    }

    /// Launch every segment's `run` concurrently on the shared barrier.
    pub fn start(&mut self) {
        for (name, segment) in self.segments.drain(..) {
            tracing::debug!(segment = %name, "starting segment");
            self.tracker.spawn(segment.run());
        }
    }

    /// Drain and discard everything the last segment emits, so terminal
    /// segments never block on their output.
    pub fn auto_drain(&mut self) {
        if let Some(mut egress) = self.egress.take() {
            self.tracker.spawn(async move {
                while egress.recv().await.is_some() {}
            });
        }
    }

    /// Send a synthetic record into the pipeline ingress.
    ///
    /// Returns `false` once the pipeline is closed.
    pub async fn inject(&self, flow: FlowRecord) -> bool {
        match &self.ingress {
            Some(tx) => tx.send(flow).await.is_ok(),
            None => false,
        }
    }

    /// The ingress sender, if the pipeline is still open.
    pub fn ingress(&self) -> Option<&FlowSender> {
        self.ingress.as_ref()
    }

    /// Take ownership of the ingress sender (used by the branch segment,
    /// which must drop it to close its sub-pipeline).
    pub fn take_ingress(&mut self) -> Option<FlowSender> {
        self.ingress.take()
    }

    /// Take ownership of the terminal receiver instead of auto-draining
    /// (tests and embedding observers).
    pub fn take_egress(&mut self) -> Option<FlowReceiver> {
        self.egress.take()
    }

    /// Close the ingress and wait until every segment has exited.
    pub async fn close(&mut self) {
        self.ingress.take();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
