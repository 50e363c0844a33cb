use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug)]
pub enum KdIndexError {
    /// A query or staged point whose length differs from the dimension count
    /// fixed at tree construction.
    #[error("Dimension mismatch: expected {expected} coordinates, got {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// An `add` past the capacity fixed at tree construction. Nothing is
    /// staged when this is returned.
    #[error("Capacity exceeded: the staging buffer holds {capacity} points.")]
    CapacityExceeded { capacity: usize },

    /// Adjacent out-of-order super keys observed after a merge sort. This
    /// indicates a bug in the sort, not bad caller input.
    #[error("Merge sort invariant violated: {0}")]
    SortInvariant(String),

    /// A median outside its subrange during the build, or a child found on
    /// the wrong side of its parent's partition during verification.
    #[error("Partition invariant violated: {0}")]
    GeometryInvariant(String),

    /// The worker pool could not be constructed.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, KdIndexError>;
