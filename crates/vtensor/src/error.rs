//! Error types surfaced by sizing, storage, and context operations.

use thiserror::Error;

/// Invalid or unsupported shape detected while sizing a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("rank {rank} exceeds the packed maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },
    #[error("shape rank {rank} does not match strides rank {strides}")]
    RankStrideMismatch { rank: usize, strides: usize },
    #[error("strides {strides:?} are neither contiguous nor channels-last for sizes {sizes:?}")]
    UnsupportedStrides {
        sizes: Vec<usize>,
        strides: Vec<usize>,
    },
    #[error("channels-last layout requires rank 4, got {rank}")]
    ChannelsLastRank { rank: usize },
    #[error("dimension value {value} does not fit the packed 32-bit form")]
    DimensionOverflow { value: usize },
    #[error("element count overflow for sizes {sizes:?}")]
    ElementOverflow { sizes: Vec<usize> },
    #[error(
        "sizes {requested:?} need {requested_len} padded elements with extents {requested_extents:?}; \
         backing holds {backing_len} with extents {backing_extents:?}"
    )]
    IncompatibleAlias {
        requested: Vec<usize>,
        requested_len: usize,
        requested_extents: [u32; 3],
        backing_len: usize,
        backing_extents: [u32; 3],
    },
}

/// Failure reported by an accelerator context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("allocation of {bytes} bytes failed: {reason}")]
    Allocation { bytes: usize, reason: String },
    #[error("resource {0} is not owned by this context")]
    UnknownResource(u64),
    #[error("barrier submission failed: {0}")]
    Submission(String),
    #[error("invalid resource request: {0}")]
    InvalidRequest(#[from] ShapeError),
}

/// Errors surfaced by storage backings and tensor views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Context(#[from] ContextError),
    /// A programming error: the call can never succeed for this object.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("{what} value {value} does not fit in {target}")]
    Narrowing {
        what: &'static str,
        value: String,
        target: &'static str,
    },
}

impl StorageError {
    pub fn invariant(message: impl Into<String>) -> Self {
        StorageError::InvariantViolation(message.into())
    }
}

/// Convenience alias for results returned by storage routines.
pub type StorageResult<T> = Result<T, StorageError>;

/// Convenience alias for results returned by context implementations.
pub type ContextResult<T> = Result<T, ContextError>;
