//! Error types for lattice design construction and validation.
//!
//! Configuration errors are raised before any numeric work is done.
//! Validation errors come from explicit layout checks and are never
//! corrected silently.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LatticeError {
    // ============ Configuration Errors ============
    /// Treatment count is not k² for an integer k >= 2.
    #[error("treatment count {0} is not a perfect square k^2 with k >= 2")]
    NotPerfectSquare(usize),

    /// Lattices are defined for 2 (simple) or 3 (triple) replications.
    #[error("replication count {0} is invalid, must be 2 (simple) or 3 (triple)")]
    InvalidReplications(usize),

    /// Block size outside the range a deterministic construction supports.
    #[error("block size {k} is outside the supported range {min}..={max} for a {lattice} lattice")]
    BlockSizeOutOfRange {
        k: usize,
        min: usize,
        max: usize,
        lattice: &'static str,
    },

    /// Yield matrix does not match the declared design.
    #[error("data shape mismatch: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    DataShape {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    /// Any other out-of-range parameter (alpha, block count, builder fields).
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    // ============ Validation Errors ============
    /// Layout breaks a structural invariant.
    #[error("invalid layout: {message}")]
    InvalidLayout { message: String },

    /// A treatment pair shares more blocks than allowed.
    #[error("treatments {first} and {second} share {count} blocks, at most {max} allowed")]
    ConcurrenceExceeded {
        first: usize,
        second: usize,
        count: usize,
        max: usize,
    },
}

pub type Result<T, E = LatticeError> = std::result::Result<T, E>;

impl LatticeError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn invalid_layout(message: impl Into<String>) -> Self {
        Self::InvalidLayout {
            message: message.into(),
        }
    }

    /// True for errors raised while constructing a design.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotPerfectSquare(_)
                | Self::InvalidReplications(_)
                | Self::BlockSizeOutOfRange { .. }
                | Self::DataShape { .. }
                | Self::InvalidParameter { .. }
        )
    }

    /// True for errors raised by explicit layout validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidLayout { .. } | Self::ConcurrenceExceeded { .. })
    }
}

impl From<derive_builder::UninitializedFieldError> for LatticeError {
    fn from(e: derive_builder::UninitializedFieldError) -> Self {
        Self::invalid_parameter(e.to_string())
    }
}

impl From<String> for LatticeError {
    fn from(message: String) -> Self {
        Self::InvalidParameter { message }
    }
}
