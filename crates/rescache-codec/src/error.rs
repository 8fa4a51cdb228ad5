//! Error types for the delta codec.

use thiserror::Error;

/// Validation failures raised while decoding a delta encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// `epochs` and `volumes` do not pair up.
    #[error("validation error: {epochs} epoch deltas but {volumes} volume deltas")]
    LengthMismatch {
        /// Length of the epoch delta list.
        epochs: usize,
        /// Length of the volume delta list.
        volumes: usize,
    },

    /// The time multiplier must be strictly positive.
    #[error("validation error: time multiplier must be positive, got {0}")]
    InvalidMultiplier(i64),

    /// A reconstructed value does not fit in an `i64` or is not finite.
    #[error("validation error: value out of range at point {index}")]
    OutOfRange {
        /// Index of the offending point.
        index: usize,
    },
}

/// A specialized Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::LengthMismatch {
            epochs: 2,
            volumes: 1,
        };
        assert_eq!(
            err.to_string(),
            "validation error: 2 epoch deltas but 1 volume deltas"
        );
    }
}
