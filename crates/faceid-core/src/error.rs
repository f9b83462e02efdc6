use thiserror::Error;

/// Errors returned by gallery, classifier and ingest operations.
///
/// Every variant is a caller or data contract violation; none is transient.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GalleryError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("arity mismatch: {samples} samples, {categories} categories")]
    ArityMismatch { samples: usize, categories: usize },

    #[error("training dataset is empty")]
    EmptyDataset,

    #[error("invalid threshold {0}: must be finite and non-negative")]
    InvalidThreshold(f32),
}
