//! Error types for the bloom filter crate

use thiserror::Error;

/// Errors that can occur while configuring or decoding filters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    #[error("Filter size exceeds maximum: {size} > {max}")]
    FilterTooLarge { size: usize, max: usize },

    #[error("Too many hash functions: {count} > {max}")]
    TooManyHashFuncs { count: u32, max: u32 },

    #[error("Invalid false positive rate: {fpr} (must be within (0, 1))")]
    InvalidFPR { fpr: f64 },

    #[error("Invalid filter parameters: {0}")]
    InvalidParameters(String),

    #[error("Malformed filterload payload: {0}")]
    Malformed(String),
}
