//! Quadratic objective for testing and well-conditioned benchmarks.

use crate::{
    error::Result,
    objective::ObjectiveFunction,
    types::{DMatrix, DVector, Scalar},
};

/// A convex quadratic objective `f(x) = 0.5·xᵀAx + bᵀx + c`.
///
/// Dataset-free: it reports a single observation so batch selection
/// degenerates to deterministic evaluation. With symmetric positive
/// definite `A` the minimizer solves `Ax = -b`, which makes this the
/// standard test objective for convergence checks.
#[derive(Debug, Clone)]
pub struct QuadraticObjective<T: Scalar> {
    /// The quadratic form matrix (should be symmetric)
    pub a: DMatrix<T>,
    /// The linear term
    pub b: DVector<T>,
    /// The constant term
    pub c: T,
}

impl<T: Scalar> QuadraticObjective<T> {
    /// Creates a new quadratic objective.
    pub fn new(a: DMatrix<T>, b: DVector<T>, c: T) -> Self {
        Self { a, b, c }
    }

    /// Creates the isotropic quadratic `f(x) = 0.5·‖x‖²`.
    pub fn isotropic(dim: usize) -> Self {
        Self {
            a: DMatrix::identity(dim, dim),
            b: DVector::zeros(dim),
            c: T::zero(),
        }
    }

    /// Closed-form minimizer `x* = -A⁻¹b`, if `A` is invertible.
    pub fn minimizer(&self) -> Option<DVector<T>> {
        self.a.clone().lu().solve(&(-&self.b))
    }
}

impl<T: Scalar> ObjectiveFunction<T> for QuadraticObjective<T> {
    fn dimension(&self) -> usize {
        self.b.len()
    }

    fn num_observations(&self) -> usize {
        1
    }

    fn value(&self, argument: &DVector<T>, _indices: &[usize]) -> Result<T> {
        let ax = &self.a * argument;
        let quad_term = argument.dot(&ax) * <T as Scalar>::from_f64(0.5);
        let linear_term = self.b.dot(argument);
        Ok(quad_term + linear_term + self.c)
    }

    fn gradient(&self, argument: &DVector<T>, _indices: &[usize]) -> Result<DVector<T>> {
        Ok(&self.a * argument + &self.b)
    }

    fn value_and_gradient(
        &self,
        argument: &DVector<T>,
        _indices: &[usize],
    ) -> Result<(T, DVector<T>)> {
        let ax = &self.a * argument;
        let value =
            argument.dot(&ax) * <T as Scalar>::from_f64(0.5) + self.b.dot(argument) + self.c;
        let gradient = ax + &self.b;
        Ok((value, gradient))
    }

    fn hessian(&self, _argument: &DVector<T>, _indices: &[usize]) -> Result<DMatrix<T>> {
        Ok(self.a.clone())
    }
}
