//! Mean-squared-error objective over an observation dataset.

use crate::{
    dataset::Dataset,
    error::Result,
    objective::ObjectiveFunction,
    types::{DMatrix, DVector, Scalar},
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Batch size above which gradient accumulation is chunked across threads.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 4096;

#[cfg(feature = "parallel")]
const PARALLEL_CHUNK: usize = 1024;

/// Mean-squared-error loss for linear regression with intercept.
///
/// For a parameter vector `θ` of dimension `d = num_features + 1` with the
/// intercept in coordinate 0, the prediction for observation `i` is
/// `h(xᵢ) = θ₀ + Σⱼ θⱼ₊₁·xᵢⱼ` and, over a batch `B`,
///
/// - value: `(1/|B|)·Σ rᵢ²` with residual `rᵢ = h(xᵢ) − yᵢ`,
/// - gradient: `(2/|B|)·X̃ᵀr` where `X̃` prepends a column of ones,
/// - Hessian: `(2/|B|)·X̃ᵀX̃` (symmetric, argument-independent).
#[derive(Debug, Clone)]
pub struct MseObjective<T: Scalar> {
    data: Dataset<T>,
}

impl<T: Scalar> MseObjective<T> {
    /// Creates the loss over the given dataset.
    pub fn new(data: Dataset<T>) -> Self {
        Self { data }
    }

    /// The underlying dataset.
    pub fn data(&self) -> &Dataset<T> {
        &self.data
    }

    /// Prediction `θ₀ + Σⱼ θⱼ₊₁·xᵢⱼ` for one observation.
    fn predict(&self, argument: &DVector<T>, index: usize) -> T {
        let features = self.data.features();
        let mut pred = argument[0];
        for j in 0..features.ncols() {
            pred += argument[j + 1] * features[(index, j)];
        }
        pred
    }

    /// Sum of squared residuals and unnormalized gradient over `indices`.
    fn accumulate(&self, argument: &DVector<T>, indices: &[usize]) -> (T, DVector<T>) {
        let features = self.data.features();
        let mut squared = T::zero();
        let mut grad = DVector::zeros(argument.len());

        for &i in indices {
            let residual = self.predict(argument, i) - self.data.response(i);
            squared += residual * residual;
            grad[0] += residual;
            for j in 0..features.ncols() {
                grad[j + 1] += residual * features[(i, j)];
            }
        }
        (squared, grad)
    }

    #[cfg(feature = "parallel")]
    fn accumulate_batch(&self, argument: &DVector<T>, indices: &[usize]) -> (T, DVector<T>) {
        if indices.len() < PARALLEL_THRESHOLD {
            return self.accumulate(argument, indices);
        }
        // Fixed chunking with a sequential reduce keeps the summation
        // order, and therefore the result, deterministic.
        let partials: Vec<(T, DVector<T>)> = indices
            .par_chunks(PARALLEL_CHUNK)
            .map(|chunk| self.accumulate(argument, chunk))
            .collect();
        let mut squared = T::zero();
        let mut grad = DVector::zeros(argument.len());
        for (s, g) in partials {
            squared += s;
            grad += g;
        }
        (squared, grad)
    }

    #[cfg(not(feature = "parallel"))]
    fn accumulate_batch(&self, argument: &DVector<T>, indices: &[usize]) -> (T, DVector<T>) {
        self.accumulate(argument, indices)
    }
}

impl<T: Scalar> ObjectiveFunction<T> for MseObjective<T> {
    fn dimension(&self) -> usize {
        self.data.num_features() + 1
    }

    fn num_observations(&self) -> usize {
        self.data.num_observations()
    }

    fn value(&self, argument: &DVector<T>, indices: &[usize]) -> Result<T> {
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());
        let mut squared = T::zero();
        for &i in indices {
            let residual = self.predict(argument, i) - self.data.response(i);
            squared += residual * residual;
        }
        Ok(squared * inv_batch)
    }

    fn gradient(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DVector<T>> {
        self.value_and_gradient(argument, indices)
            .map(|(_, gradient)| gradient)
    }

    fn value_and_gradient(
        &self,
        argument: &DVector<T>,
        indices: &[usize],
    ) -> Result<(T, DVector<T>)> {
        let (squared, grad) = self.accumulate_batch(argument, indices);
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());
        let two = <T as Scalar>::from_f64(2.0);
        Ok((squared * inv_batch, grad * (two * inv_batch)))
    }

    fn hessian(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DMatrix<T>> {
        let features = self.data.features();
        let d = argument.len();
        let mut hessian = DMatrix::zeros(d, d);
        let scale = <T as Scalar>::from_f64(2.0) / <T as Scalar>::from_usize(indices.len());

        // (2/|B|)·X̃ᵀX̃ with the implicit leading column of ones.
        for &i in indices {
            for p in 0..d {
                let xp = if p == 0 {
                    T::one()
                } else {
                    features[(i, p - 1)]
                };
                for q in p..d {
                    let xq = if q == 0 {
                        T::one()
                    } else {
                        features[(i, q - 1)]
                    };
                    hessian[(p, q)] += xp * xq * scale;
                }
            }
        }
        // Mirror the upper triangle.
        for p in 0..d {
            for q in 0..p {
                hessian[(p, q)] = hessian[(q, p)];
            }
        }
        Ok(hessian)
    }
}
