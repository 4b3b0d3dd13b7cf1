//! Error types for objective-function evaluation and solver runs.
//!
//! This module defines the core error types used throughout the library.
//! Objective-function violations are detected before any computation; solver
//! configuration problems are detected before the first iteration.

use thiserror::Error;

/// Errors that can occur while evaluating an objective function.
#[derive(Debug, Clone, Error)]
pub enum ObjectiveError {
    /// A vector or buffer has the wrong shape.
    ///
    /// This error occurs when the supplied argument, gradient, or data
    /// buffer does not match the dimension the objective expects. Shapes
    /// are never silently truncated or padded.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    InvalidDimension {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// A batch index lies outside the observation range.
    ///
    /// Detected before the index is used.
    #[error("Observation index {index} out of range [0, {len})")]
    IndexOutOfRange {
        /// The offending index
        index: usize,
        /// Number of observations
        len: usize,
    },

    /// Numerical instability detected during evaluation.
    #[error("Numerical instability detected: {reason}")]
    NumericalError {
        /// Description of the numerical issue
        reason: String,
    },

    /// Method or output not implemented for this objective.
    ///
    /// Used for optional outputs (typically the Hessian) that a concrete
    /// objective does not provide.
    #[error("Feature not implemented: {feature}")]
    NotImplemented {
        /// Name of the unimplemented feature
        feature: String,
    },
}

impl ObjectiveError {
    /// Create an InvalidDimension error.
    pub fn invalid_dimension<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::InvalidDimension {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an IndexOutOfRange error.
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { index, len }
    }

    /// Create a NumericalError with a custom reason.
    pub fn numerical_error<S: Into<String>>(reason: S) -> Self {
        Self::NumericalError {
            reason: reason.into(),
        }
    }

    /// Create a NotImplemented error for a specific feature.
    pub fn not_implemented<S: Into<String>>(feature: S) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }
}

/// Errors that can occur when configuring or running a solver.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// Invalid solver configuration.
    ///
    /// This error occurs when a solver is configured with invalid
    /// parameters (e.g. zero batch size, negative tolerance) and is
    /// raised before the first iteration runs.
    #[error("Invalid solver configuration: {reason} (parameter `{parameter}` = {value})")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
    },

    /// Propagated objective-function error.
    #[error("Objective evaluation failed: {0}")]
    Objective(#[from] ObjectiveError),
}

impl SolverError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }
}

/// Result type alias for objective-function evaluation.
pub type Result<T> = std::result::Result<T, ObjectiveError>;

/// Result type alias for solver operations.
pub type SolverResult<T> = std::result::Result<T, SolverError>;
