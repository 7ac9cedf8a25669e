//! Error types for the kiln IR.

/// Errors raised when querying or validating IR.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for its arena.
    #[error("handle index {index} out of bounds (arena size: {size})")]
    BadHandle { index: usize, size: usize },

    /// An expression has no resolved type recorded.
    #[error("expression [{index}] has no resolved type")]
    MissingExpressionType { index: usize },

    /// A compute entry point has a zero workgroup dimension.
    #[error("invalid workgroup size: [{}, {}, {}]", .0[0], .0[1], .0[2])]
    InvalidWorkgroupSize([u32; 3]),
}
