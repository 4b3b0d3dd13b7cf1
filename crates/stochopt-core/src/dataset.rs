//! Observation data for data-driven objective functions.
//!
//! A [`Dataset`] pairs a feature matrix (rows = observations, columns =
//! features) with a dependent-variable vector of matching length. Shape
//! consistency is checked once at construction so objectives can assume a
//! valid layout.

use crate::{
    error::{ObjectiveError, Result},
    types::{DMatrix, DVector, Scalar},
};

/// A feature matrix together with its dependent variable.
///
/// Rows of `features` are observations, columns are features. The
/// dependent variable has one entry per observation. Both buffers are
/// immutable for the lifetime of the dataset.
#[derive(Debug, Clone)]
pub struct Dataset<T: Scalar> {
    features: DMatrix<T>,
    responses: DVector<T>,
}

impl<T: Scalar> Dataset<T> {
    /// Creates a dataset from a feature matrix and a response vector.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDimension` when the number of feature rows does
    /// not match the number of responses, or when the dataset is empty.
    pub fn new(features: DMatrix<T>, responses: DVector<T>) -> Result<Self> {
        if features.nrows() != responses.len() {
            return Err(ObjectiveError::invalid_dimension(
                format!("{} response rows", features.nrows()),
                format!("{} response rows", responses.len()),
            ));
        }
        if features.nrows() == 0 {
            return Err(ObjectiveError::invalid_dimension(
                "at least 1 observation",
                "0 observations",
            ));
        }
        Ok(Self {
            features,
            responses,
        })
    }

    /// Number of observations (rows).
    pub fn num_observations(&self) -> usize {
        self.features.nrows()
    }

    /// Number of features (columns).
    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// The feature matrix.
    pub fn features(&self) -> &DMatrix<T> {
        &self.features
    }

    /// The dependent-variable vector.
    pub fn responses(&self) -> &DVector<T> {
        &self.responses
    }

    /// Response value for one observation.
    pub fn response(&self, index: usize) -> T {
        self.responses[index]
    }

    /// Validates that every index addresses an observation.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` for the first offending index, before
    /// any index is used.
    pub fn check_indices(&self, indices: &[usize]) -> Result<()> {
        let n = self.num_observations();
        for &index in indices {
            if index >= n {
                return Err(ObjectiveError::index_out_of_range(index, n));
            }
        }
        Ok(())
    }
}
