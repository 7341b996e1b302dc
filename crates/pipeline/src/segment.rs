//! Segment contract
//!
//! Every processing stage implements [`Segment`]; a [`SegmentFactory`] per
//! segment type turns validated configuration into fresh instances.
//!
//! # Lifecycle
//!
//! 1. `create` - pure factory. Validates options, returns an un-wired
//!    instance or a configuration error (the build aborts). Must not spawn
//!    tasks, open sockets, or allocate channels.
//! 2. `rewire` - installs the input/output endpoints. Called exactly once by
//!    the builder, before `run`.
//! 3. `run` - consumes the segment. It must drain `input` until the channel
//!    closes, flush any pending work, and only then return. Returning drops
//!    the held [`FlowSender`], which closes the downstream channel - that is
//!    the teardown wave that lets the whole graph shut down in order.
//!
//! Every record received is either forwarded exactly once or deliberately
//! dropped (filter behavior). Segments never receive an out-of-band cancel;
//! input closure is the only stop signal.

use async_trait::async_trait;
use tokio::sync::mpsc;

use flowpipe_flow::FlowRecord;

use crate::config::SegmentConfig;
use crate::error::Result;

/// Sending half of an inter-segment channel.
pub type FlowSender = mpsc::Sender<FlowRecord>;

/// Receiving half of an inter-segment channel.
pub type FlowReceiver = mpsc::Receiver<FlowRecord>;

/// A single processing stage.
#[async_trait]
pub trait Segment: Send + std::fmt::Debug {
    /// Install the channel endpoints. Called exactly once, before `run`.
    fn rewire(&mut self, input: FlowReceiver, output: FlowSender);

    /// Process flows until the input channel closes, then flush and return.
    async fn run(self: Box<Self>);
}

/// Factory for one segment type.
///
/// Registered in the [`SegmentRegistry`](crate::SegmentRegistry) under
/// [`name`](SegmentFactory::name); the builder calls
/// [`create`](SegmentFactory::create) for every config entry.
pub trait SegmentFactory: Send + Sync {
    /// The name used in config files (e.g. `"lumberjack"`).
    fn name(&self) -> &'static str;

    /// Create a fresh, un-wired segment from validated configuration.
    ///
    /// # Errors
    ///
    /// Any configuration problem (unknown value, out-of-range number,
    /// invalid URL or expression) aborts the pipeline build.
    fn create(&self, config: &SegmentConfig) -> Result<Box<dyn Segment>>;
}

/// Channel endpoint storage shared by all segment implementations.
///
/// The default `rewire` body: segments embed a `SegmentIo`, forward
/// `rewire` to [`attach`](SegmentIo::attach), and call
/// [`take`](SegmentIo::take) at the top of `run`.
#[derive(Debug, Default)]
pub struct SegmentIo {
    input: Option<FlowReceiver>,
    output: Option<FlowSender>,
}

impl SegmentIo {
    /// Store the endpoints installed by the builder.
    pub fn attach(&mut self, input: FlowReceiver, output: FlowSender) {
        self.input = Some(input);
        self.output = Some(output);
    }

    /// Hand the endpoints to the run loop.
    ///
    /// # Panics
    ///
    /// Panics if the segment was never rewired - a framework bug, not a
    /// runtime condition.
    pub fn take(&mut self) -> (FlowReceiver, FlowSender) {
        let input = self.input.take().expect("segment was not rewired");
        let output = self.output.take().expect("segment was not rewired");
        (input, output)
    }
}
