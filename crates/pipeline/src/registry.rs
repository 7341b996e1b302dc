//! Segment registry
//!
//! Process-wide mapping from segment name to factory. Populated once at
//! startup (Rust has no import side effects, so registration is an explicit
//! step - see `flowpipe_segments::default_registry`), read-only afterwards.

use std::collections::HashMap;

use crate::config::SegmentConfig;
use crate::error::{PipelineError, Result};
use crate::segment::{Segment, SegmentFactory};

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;

/// Registry of segment factories.
pub struct SegmentRegistry {
    factories: HashMap<String, Box<dyn SegmentFactory>>,
}

impl SegmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under its own name.
    ///
    /// Registering the same name twice is a programmer error; the last
    /// registration wins and a warning is logged.
    pub fn register(&mut self, factory: Box<dyn SegmentFactory>) {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), factory).is_some() {
            tracing::warn!(
                segment = %name,
                "duplicate segment registration, last registration wins"
            );
        }
    }

    /// Instantiate a segment by name.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownSegment`] when the name is not registered
    /// (the message lists the available names), or whatever configuration
    /// error the factory reports.
    pub fn create(&self, name: &str, config: &SegmentConfig) -> Result<Box<dyn Segment>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PipelineError::UnknownSegment {
                name: name.to_string(),
                available: self.available().join(", "),
            })?;
        factory.create(config)
    }

    /// Whether a segment name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Sorted list of registered segment names.
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for SegmentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
