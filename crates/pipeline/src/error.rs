//! Pipeline error types
//!
//! Configuration errors surface synchronously from segment factories and the
//! builder; the process aborts startup on any of them. Transient runtime
//! errors never cross segment boundaries (they are handled locally and are
//! visible only through logs and metrics).

use thiserror::Error;

/// Pipeline and configuration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Config referenced a segment name that is not registered
    #[error("unknown segment '{name}', available: [{available}]")]
    UnknownSegment { name: String, available: String },

    /// A segment option that must be present was not
    #[error("segment '{segment}': missing required option '{option}'")]
    MissingOption {
        segment: &'static str,
        option: &'static str,
    },

    /// A segment option failed validation
    #[error("segment '{segment}': invalid option '{option}': {reason}")]
    InvalidOption {
        segment: &'static str,
        option: String,
        reason: String,
    },

    /// Structural problem with the pipeline definition
    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    /// The configuration file did not parse
    #[error("failed to parse pipeline configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl PipelineError {
    /// Shorthand for [`PipelineError::InvalidOption`].
    pub fn invalid_option(
        segment: &'static str,
        option: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::InvalidOption {
            segment,
            option: option.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
