//! Flowpipe - Pipeline runtime
//!
//! The segment abstraction and the machinery that turns a declarative
//! configuration into a running dataflow graph.
//!
//! # Architecture
//!
//! ```text
//! config.yml ──→ [Builder] ──→ [Pipeline]
//!                    │             │
//!          [SegmentRegistry]       ├─ ingress ─→ seg₁ ─→ seg₂ ─→ ... ─→ segₙ ─→ auto-drain
//!           name → factory         └─ TaskTracker barrier
//! ```
//!
//! # Key Design
//!
//! - **Segment contract**: `create` (pure factory, validates config),
//!   `rewire` (installs channel endpoints, once), `run` (drains input,
//!   flushes, drops output). See [`Segment`].
//! - **Backpressure**: capacity-1 bounded channels between segments; a slow
//!   downstream stalls the upstream after at most one in-flight record.
//! - **Teardown**: closing the ingress propagates channel closure segment by
//!   segment; [`Pipeline::close`] awaits the shared task-tracker barrier.
//!   There is no out-of-band cancellation.
//! - **Branching**: a `branch` entry carries `then`/`else` segment lists;
//!   the builder constructs the two sub-pipelines and the branch segment
//!   dispatches each record to exactly one of them.
//!
//! # Example
//!
//! ```ignore
//! let registry = flowpipe_segments::default_registry();
//! let mut pipeline = Pipeline::from_config(&registry, &yaml)?;
//! pipeline.start();
//! pipeline.auto_drain();
//! // ... until interrupted ...
//! pipeline.close().await;
//! ```

mod branch;
mod builder;
mod config;
mod error;
mod pipeline;
mod registry;
mod segment;

pub mod testkit;

pub use branch::BranchSegment;
pub use builder::PipelineBuilder;
pub use config::{parse_config, SegmentConfig, SegmentEntry};
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use registry::SegmentRegistry;
pub use segment::{FlowReceiver, FlowSender, Segment, SegmentFactory, SegmentIo};

// Re-export the record type segments operate on.
pub use flowpipe_flow::FlowRecord;

/// Capacity of the channels connecting adjacent segments.
///
/// Kept minimal so that backpressure from a slow sink reaches the source
/// with at most one record in flight per hop.
pub const SEGMENT_CHANNEL_CAPACITY: usize = 1;

#[cfg(test)]
pub(crate) mod test_segments;
