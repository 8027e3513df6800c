use thiserror::Error;

/// A result type for active-set selection algorithm
pub type Result<T> = std::result::Result<T, LseError>;

/// An error when using [`ActiveSetSelection`](crate::ActiveSetSelection) or one of its building blocks
#[derive(Error, Debug)]
pub enum LseError {
    /// When a parameter or an input has a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
    /// When point dimensions do not match
    #[error("Dimension error: expected {expected}, got {actual}")]
    DimensionError {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },
    /// When a point index does not exist in the candidate pool
    #[error("Index error: {index} out of range for {size} points")]
    IndexOutOfRangeError {
        /// Requested index
        index: usize,
        /// Number of points
        size: usize,
    },
    /// When activating a point twice
    #[error("Point {0} is already active")]
    AlreadyActiveError(usize),
    /// When a classification state transition is not allowed
    #[error("Classification error: {0}")]
    ClassificationError(String),
    /// When growing an active set already at its capacity
    #[error("Capacity error: active set is full ({0} points)")]
    CapacityError(usize),
    /// When the incremental factorization meets a non positive pivot
    #[error("Not positive definite: {0}")]
    NotPositiveDefiniteError(String),
    #[error(transparent)]
    /// When linear algebra computation fails
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When the compute thread pool cannot be built
    #[error("Thread pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// When error statistics cannot be computed
    #[error("Statistics error: {0}")]
    StatsError(#[from] ndarray_stats::errors::MinMaxError),
    /// When exporting arrays fails
    #[error("Export error: {0}")]
    ExportError(#[from] ndarray_npy::WriteNpyError),
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    /// When saving or loading a selection fails
    SaveError(#[from] serde_json::Error),
    /// When an IO operation fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
}
