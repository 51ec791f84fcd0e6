//! Structured error types for the metaflux workspace.

use thiserror::Error;

/// Unified error type for all metaflux operations.
#[derive(Debug, Error)]
pub enum MetafluxError {
    /// Invalid run configuration (unknown algorithm, cluster count out of
    /// range, too few usable samples for a validity sweep).
    #[error("configuration error: {0}")]
    Config(String),

    /// Input carries no usable signal (all pairwise distances zero, every
    /// feature vector degenerate after filtering).
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// A p-value collection changed shape mid-correction. Always a bug,
    /// never user-recoverable.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid input (bad arguments, out-of-range values)
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias used throughout the metaflux workspace.
pub type Result<T> = std::result::Result<T, MetafluxError>;
