use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// `index` is the dataset index of the offending example.
    #[error("example {index} declares length {length} but stores {stored} time steps")]
    InvalidLength {
        index: usize,
        length: usize,
        stored: usize,
    },

    /// `row` is a position inside an already assembled batch, not a dataset index.
    #[error("batch row {row} has invalid length {length} for {t_max} padded time steps")]
    InvalidRowLength {
        row: usize,
        length: usize,
        t_max: usize,
    },

    #[error("{field}: expected {expected}, found {found}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("cannot assemble a mini-batch from zero examples")]
    EmptyBatch,

    #[error("example index {index} out of range for a dataset of {len} examples")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("sequence lengths must be non-increasing, found {next} after {prev}")]
    UnsortedLengths { prev: usize, next: usize },

    #[error("batch size must be at least 1")]
    InvalidBatchSize,
}
