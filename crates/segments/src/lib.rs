//! Flowpipe - Built-in segments
//!
//! Every processing stage that ships with flowpipe, grouped the way they act
//! on the stream:
//!
//! - [`input`] - sources that feed decoded flows into the pipeline
//! - [`modify`] - enrichment and field rewriting
//! - [`filter`] - admission filters that swallow non-matching records
//! - [`output`] - exporters that ship flows to external systems
//! - [`pass`] - the identity segment
//!
//! # Registration
//!
//! Segments are made available to the pipeline builder through
//! [`default_registry`], the explicit registration step run once at startup:
//!
//! ```
//! let registry = flowpipe_segments::default_registry();
//! assert!(registry.contains("lumberjack"));
//! ```

pub mod filter;
pub mod input;
pub mod modify;
pub mod output;
pub mod pass;

use flowpipe_pipeline::SegmentRegistry;

/// Build a registry with every built-in segment registered.
///
/// The `branch` control-flow entry is handled structurally by the pipeline
/// builder and therefore has no factory here.
pub fn default_registry() -> SegmentRegistry {
    let mut registry = SegmentRegistry::new();
    registry.register(Box::new(pass::PassFactory));
    registry.register(Box::new(input::netflow::NetflowFactory));
    registry.register(Box::new(modify::addrstrings::AddrStringsFactory));
    registry.register(Box::new(modify::dropfields::DropFieldsFactory));
    registry.register(Box::new(modify::protomap::ProtomapFactory));
    registry.register(Box::new(modify::reversedns::ReverseDnsFactory));
    registry.register(Box::new(filter::drop::DropFactory));
    registry.register(Box::new(filter::elephant::ElephantFactory));
    registry.register(Box::new(filter::flowfilter::FlowFilterFactory));
    registry.register(Box::new(output::lumberjack::LumberjackFactory));
    registry
}
