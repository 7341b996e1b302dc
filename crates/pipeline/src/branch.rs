//! Branch segment
//!
//! Control-flow segment that routes each record into one of two nested
//! sub-pipelines based on a predicate. A record that enters the branch
//! emerges exactly once at the branch output; relative ordering between the
//! two arms is not preserved.

use async_trait::async_trait;
use tokio_util::task::TaskTracker;

use flowpipe_flow::FlowPredicate;

use crate::pipeline::Pipeline;
use crate::segment::{FlowReceiver, FlowSender, Segment, SegmentIo};

#[cfg(test)]
#[path = "branch_test.rs"]
mod tests;

/// Routes records into `then`/`else` sub-pipelines by predicate.
#[derive(Debug)]
pub struct BranchSegment {
    io: SegmentIo,
    condition: FlowPredicate,
    then_pipeline: Pipeline,
    else_pipeline: Pipeline,
}

impl BranchSegment {
    pub(crate) fn new(
        condition: FlowPredicate,
        then_pipeline: Pipeline,
        else_pipeline: Pipeline,
    ) -> Self {
        Self {
            io: SegmentIo::default(),
            condition,
            then_pipeline,
            else_pipeline,
        }
    }
}

#[async_trait]
impl Segment for BranchSegment {
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender) {
        self.io.attach(input, output);
    }

    async fn run(mut self: Box<Self>) {
        let (mut input, output) = self.io.take();

        self.then_pipeline.start();
        self.else_pipeline.start();

        let then_in = self
            .then_pipeline
            .take_ingress()
            .expect("branch sub-pipeline has no ingress");
        let else_in = self
            .else_pipeline
            .take_ingress()
            .expect("branch sub-pipeline has no ingress");
        let then_out = self
            .then_pipeline
            .take_egress()
            .expect("branch sub-pipeline has no egress");
        let else_out = self
            .else_pipeline
            .take_egress()
            .expect("branch sub-pipeline has no egress");

        // Both arms merge into the branch output. The forwarders hold the
        // only clones of `output`, so the branch output closes exactly when
        // both arms have drained.
        let merge = TaskTracker::new();
        for mut arm in [then_out, else_out] {
            let out = output.clone();
            merge.spawn(async move {
                while let Some(flow) = arm.recv().await {
                    if out.send(flow).await.is_err() {
                        break;
                    }
                }
            });
        }
        merge.close();
        drop(output);

        while let Some(flow) = input.recv().await {
            let target = if self.condition.matches(&flow) {
                &then_in
            } else {
                &else_in
            };
            if target.send(flow).await.is_err() {
                tracing::warn!(segment = "branch", "sub-pipeline closed early, dropping flow");
            }
        }

        drop(then_in);
        drop(else_in);
        self.then_pipeline.close().await;
        self.else_pipeline.close().await;
        merge.wait().await;
    }
}

/// Identity segment used for an omitted branch arm.
#[derive(Default)]
#[derive(Debug)]
pub(crate) struct Passthrough {
    io: SegmentIo,
}

#[async_trait]
impl Segment for Passthrough {
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
