//! Error type shared by every filter, the registry and the dispatcher.

use thiserror::Error;

/// Errors that can occur while validating or running a filter job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// No filter is registered under the requested name.
    #[error("unknown filter: {0:?}")]
    UnknownFilter(String),

    /// Zero-sized image, buffer length mismatch or mismatched shapes.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Kernel length or layout the convolution engine cannot center.
    #[error("invalid kernel: {0}")]
    InvalidKernel(String),

    /// Double-threshold classification requires `max > min`.
    #[error("invalid thresholds: max ({max}) must be greater than min ({min})")]
    InvalidThresholds { min: u8, max: u8 },

    /// A job is already in flight on this dispatcher.
    #[error("dispatcher is busy with another filter job")]
    Busy,

    /// The job observed its cancel token between pipeline stages.
    #[error("filter job was cancelled")]
    Cancelled,

    /// The worker failed while running the filter.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The dispatcher's worker has already been shut down.
    #[error("dispatcher has shut down")]
    ShutDown,

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilterError>;
