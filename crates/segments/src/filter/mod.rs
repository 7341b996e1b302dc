//! Admission filter segments
//!
//! Filters express drop semantics by simply not forwarding a record; they
//! never emit a record twice and never mutate what they forward.

pub mod drop;
pub mod elephant;
pub mod flowfilter;
