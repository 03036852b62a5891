//! Engine error taxonomy.
//!
//! Data-model violations fail the build or dispatch call that detected them;
//! per-query conditions (too few neighbors, ill-conditioned fits) are data
//! values, not errors, and never appear here.

use thiserror::Error;

/// Errors surfaced by octree construction and evaluator dispatch.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Input geometry violates the data model: empty splat set, non-positive
    /// or non-finite radius, or a splat whose expanded bounding box falls
    /// outside the grid.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A 32-bit index budget was exceeded: too many splats, too many command
    /// entries, or too many octree cells for the configured levels.
    #[error("overflow: {0}")]
    Overflow(String),

    /// Engine configuration is out of range (levels, subsampling, workgroup
    /// size, boundary limit) or inconsistent with the dispatch arguments.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
