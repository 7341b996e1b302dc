//! Flowpipe - Flow data model
//!
//! The shared value object that travels through the pipeline, plus the
//! lookup tables and predicate expressions that operate on it.
//!
//! # Overview
//!
//! - [`FlowRecord`] - one unit of network telemetry. Raw wire-derived fields
//!   (addresses as byte slices, packed MACs, counters, timestamps) live next
//!   to enrichment fields (string forms, hostnames, protocol name) that
//!   upstream segments fill in.
//! - [`iana`] - the IANA protocol-numbers registry as a static table.
//! - [`filter`] - a small predicate language (`proto 4`, `port <50`,
//!   `bytes >= 1000 and not dstas 65000`) used by the flow filter segment
//!   and by branch conditions.

mod record;

pub mod filter;
pub mod iana;

pub use filter::{FilterError, FlowPredicate};
pub use record::{Field, FlowRecord, MacSeparator};
