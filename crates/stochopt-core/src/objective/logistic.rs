//! Logistic log-loss objective over an observation dataset.

use crate::{
    dataset::Dataset,
    error::Result,
    objective::ObjectiveFunction,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;

/// Mean logistic log-loss for binary classification with intercept.
///
/// Responses must be 0/1. With margin `mᵢ = θ₀ + Σⱼ θⱼ₊₁·xᵢⱼ` and
/// `pᵢ = σ(mᵢ)`, over a batch `B`:
///
/// - value: `(1/|B|)·Σ [softplus(mᵢ) − yᵢ·mᵢ]`,
/// - gradient: `(1/|B|)·X̃ᵀ(p − y)`,
/// - Hessian: `(1/|B|)·X̃ᵀ diag(pᵢ(1−pᵢ)) X̃` (symmetric positive
///   semidefinite, so the loss is convex).
#[derive(Debug, Clone)]
pub struct LogisticObjective<T: Scalar> {
    data: Dataset<T>,
}

impl<T: Scalar> LogisticObjective<T> {
    /// Creates the loss over the given dataset.
    pub fn new(data: Dataset<T>) -> Self {
        Self { data }
    }

    /// The underlying dataset.
    pub fn data(&self) -> &Dataset<T> {
        &self.data
    }

    fn margin(&self, argument: &DVector<T>, index: usize) -> T {
        let features = self.data.features();
        let mut m = argument[0];
        for j in 0..features.ncols() {
            m += argument[j + 1] * features[(index, j)];
        }
        m
    }

    /// Numerically stable `ln(1 + eᵐ)`.
    fn softplus(m: T) -> T {
        if m > T::zero() {
            m + <T as Float>::ln_1p(<T as Float>::exp(-m))
        } else {
            <T as Float>::ln_1p(<T as Float>::exp(m))
        }
    }

    fn sigmoid(m: T) -> T {
        if m >= T::zero() {
            T::one() / (T::one() + <T as Float>::exp(-m))
        } else {
            let e = <T as Float>::exp(m);
            e / (T::one() + e)
        }
    }
}

impl<T: Scalar> ObjectiveFunction<T> for LogisticObjective<T> {
    fn dimension(&self) -> usize {
        self.data.num_features() + 1
    }

    fn num_observations(&self) -> usize {
        self.data.num_observations()
    }

    fn value(&self, argument: &DVector<T>, indices: &[usize]) -> Result<T> {
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());
        let mut loss = T::zero();
        for &i in indices {
            let m = self.margin(argument, i);
            loss += Self::softplus(m) - self.data.response(i) * m;
        }
        Ok(loss * inv_batch)
    }

    fn value_and_gradient(
        &self,
        argument: &DVector<T>,
        indices: &[usize],
    ) -> Result<(T, DVector<T>)> {
        let features = self.data.features();
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());
        let mut loss = T::zero();
        let mut grad = DVector::zeros(argument.len());

        for &i in indices {
            let m = self.margin(argument, i);
            let y = self.data.response(i);
            loss += Self::softplus(m) - y * m;

            let slack = Self::sigmoid(m) - y;
            grad[0] += slack;
            for j in 0..features.ncols() {
                grad[j + 1] += slack * features[(i, j)];
            }
        }
        Ok((loss * inv_batch, grad * inv_batch))
    }

    fn gradient(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DVector<T>> {
        self.value_and_gradient(argument, indices)
            .map(|(_, gradient)| gradient)
    }

    fn hessian(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DMatrix<T>> {
        let features = self.data.features();
        let d = argument.len();
        let mut hessian = DMatrix::zeros(d, d);
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());

        for &i in indices {
            let p = Self::sigmoid(self.margin(argument, i));
            let weight = p * (T::one() - p) * inv_batch;
            for r in 0..d {
                let xr = if r == 0 {
                    T::one()
                } else {
                    features[(i, r - 1)]
                };
                for s in r..d {
                    let xs = if s == 0 {
                        T::one()
                    } else {
                        features[(i, s - 1)]
                    };
                    hessian[(r, s)] += weight * xr * xs;
                }
            }
        }
        for r in 0..d {
            for s in 0..r {
                hessian[(r, s)] = hessian[(s, r)];
            }
        }
        Ok(hessian)
    }
}
