//! Objective-function interface for the iterative solvers.
//!
//! An objective function computes the value, gradient, and optionally the
//! Hessian of a scalar function of a parameter vector, evaluated over a
//! subset of observations (a mini-batch). The interface supports different
//! evaluation modes to avoid redundant computations and falls back to
//! finite-difference approximations when an analytic gradient is not
//! available.
//!
//! Evaluations are deterministic: identical arguments and batch indices
//! always produce identical outputs.

mod logistic;
mod mse;
mod quadratic;

pub use logistic::LogisticObjective;
pub use mse::MseObjective;
pub use quadratic::QuadraticObjective;

use crate::{
    error::{ObjectiveError, Result},
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;
use std::fmt::Debug;

/// Set of outputs requested from one evaluation call.
///
/// A requested output is never left unpopulated after a successful
/// evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationRequest {
    /// Compute the objective value.
    pub value: bool,
    /// Compute the gradient.
    pub gradient: bool,
    /// Compute the Hessian.
    pub hessian: bool,
}

impl EvaluationRequest {
    /// Request the objective value only.
    pub fn value() -> Self {
        Self {
            value: true,
            gradient: false,
            hessian: false,
        }
    }

    /// Request the gradient only.
    pub fn gradient() -> Self {
        Self {
            value: false,
            gradient: true,
            hessian: false,
        }
    }

    /// Request value and gradient together.
    pub fn value_and_gradient() -> Self {
        Self {
            value: true,
            gradient: true,
            hessian: false,
        }
    }

    /// Request value, gradient, and Hessian.
    pub fn all() -> Self {
        Self {
            value: true,
            gradient: true,
            hessian: true,
        }
    }

    /// Additionally request the Hessian.
    pub fn with_hessian(mut self) -> Self {
        self.hessian = true;
        self
    }
}

/// Outputs of one evaluation call.
///
/// Fields corresponding to outputs that were not requested are `None`.
#[derive(Debug, Clone)]
pub struct Evaluation<T: Scalar> {
    /// Objective value, if requested.
    pub value: Option<T>,
    /// Gradient of dimension `d`, if requested.
    pub gradient: Option<DVector<T>>,
    /// Hessian of shape `d×d`, if requested.
    pub hessian: Option<DMatrix<T>>,
}

impl<T: Scalar> Evaluation<T> {
    fn empty() -> Self {
        Self {
            value: None,
            gradient: None,
            hessian: None,
        }
    }
}

/// Trait for objective functions evaluated over observation batches.
///
/// This is the main trait the solvers use to evaluate the function being
/// minimized and its derivatives. Implementations must be deterministic
/// and side-effect free from the solver's point of view.
pub trait ObjectiveFunction<T: Scalar>: Debug {
    /// Dimension `d` of the parameter vector.
    fn dimension(&self) -> usize;

    /// Number of observations `n` the objective is defined over.
    ///
    /// Dataset-free objectives report 1 so full-batch solvers degenerate
    /// to deterministic evaluation.
    fn num_observations(&self) -> usize;

    /// Evaluates the objective value over the given batch.
    fn value(&self, argument: &DVector<T>, indices: &[usize]) -> Result<T>;

    /// Evaluates the gradient over the given batch.
    ///
    /// # Default Implementation
    ///
    /// Central finite differences on [`value`](Self::value). Concrete
    /// losses override this with their analytic gradient.
    fn gradient(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DVector<T>> {
        self.gradient_fd(argument, indices)
    }

    /// Evaluates value and gradient together.
    ///
    /// Override when both can share intermediate results.
    fn value_and_gradient(
        &self,
        argument: &DVector<T>,
        indices: &[usize],
    ) -> Result<(T, DVector<T>)> {
        let value = self.value(argument, indices)?;
        let gradient = self.gradient(argument, indices)?;
        Ok((value, gradient))
    }

    /// Evaluates the Hessian over the given batch.
    ///
    /// # Default Implementation
    ///
    /// Returns `NotImplemented`. Override for second-order methods.
    fn hessian(&self, _argument: &DVector<T>, _indices: &[usize]) -> Result<DMatrix<T>> {
        Err(ObjectiveError::not_implemented(
            "Hessian computation not implemented for this objective",
        ))
    }

    /// Computes the gradient using central finite differences.
    fn gradient_fd(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DVector<T>> {
        let d = argument.len();
        let mut gradient = DVector::zeros(d);
        let h = <T as Float>::sqrt(T::EPSILON);

        for i in 0..d {
            let mut plus = argument.clone();
            let mut minus = argument.clone();
            plus[i] += h;
            minus[i] -= h;

            let f_plus = self.value(&plus, indices)?;
            let f_minus = self.value(&minus, indices)?;
            gradient[i] = (f_plus - f_minus) / (h + h);
        }

        Ok(gradient)
    }

    /// Validates an evaluation call before any computation.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` when the argument length differs from
    /// [`dimension`](Self::dimension) or the batch is empty;
    /// `IndexOutOfRange` when any index lies outside `[0, n)`.
    fn validate(&self, argument: &DVector<T>, indices: &[usize]) -> Result<()> {
        if argument.len() != self.dimension() {
            return Err(ObjectiveError::invalid_dimension(
                format!("argument of length {}", self.dimension()),
                format!("argument of length {}", argument.len()),
            ));
        }
        if indices.is_empty() {
            return Err(ObjectiveError::invalid_dimension(
                "non-empty batch",
                "batch of 0 indices",
            ));
        }
        let n = self.num_observations();
        for &index in indices {
            if index >= n {
                return Err(ObjectiveError::index_out_of_range(index, n));
            }
        }
        Ok(())
    }

    /// Evaluates the requested subset of {value, gradient, Hessian}.
    ///
    /// Inputs are validated before any computation; every requested output
    /// is populated on success.
    fn evaluate(
        &self,
        argument: &DVector<T>,
        indices: &[usize],
        request: EvaluationRequest,
    ) -> Result<Evaluation<T>> {
        self.validate(argument, indices)?;

        let mut out = Evaluation::empty();
        if request.value && request.gradient {
            let (value, gradient) = self.value_and_gradient(argument, indices)?;
            out.value = Some(value);
            out.gradient = Some(gradient);
        } else if request.value {
            out.value = Some(self.value(argument, indices)?);
        } else if request.gradient {
            out.gradient = Some(self.gradient(argument, indices)?);
        }
        if request.hessian {
            out.hessian = Some(self.hessian(argument, indices)?);
        }
        Ok(out)
    }
}

/// Wrapper counting evaluations for testing and diagnostics.
#[derive(Debug)]
pub struct CountingObjective<F> {
    /// The underlying objective function
    pub inner: F,
    value_count: std::cell::Cell<usize>,
    gradient_count: std::cell::Cell<usize>,
    hessian_count: std::cell::Cell<usize>,
}

impl<F> CountingObjective<F> {
    /// Creates a new counting wrapper around an objective.
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            value_count: std::cell::Cell::new(0),
            gradient_count: std::cell::Cell::new(0),
            hessian_count: std::cell::Cell::new(0),
        }
    }

    /// Resets all counters to zero.
    pub fn reset_counts(&self) {
        self.value_count.set(0);
        self.gradient_count.set(0);
        self.hessian_count.set(0);
    }

    /// Returns the current (value, gradient, hessian) evaluation counts.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.value_count.get(),
            self.gradient_count.get(),
            self.hessian_count.get(),
        )
    }
}

impl<T, F> ObjectiveFunction<T> for CountingObjective<F>
where
    T: Scalar,
    F: ObjectiveFunction<T>,
{
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn num_observations(&self) -> usize {
        self.inner.num_observations()
    }

    fn value(&self, argument: &DVector<T>, indices: &[usize]) -> Result<T> {
        self.value_count.set(self.value_count.get() + 1);
        self.inner.value(argument, indices)
    }

    fn gradient(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DVector<T>> {
        self.gradient_count.set(self.gradient_count.get() + 1);
        self.inner.gradient(argument, indices)
    }

    fn value_and_gradient(
        &self,
        argument: &DVector<T>,
        indices: &[usize],
    ) -> Result<(T, DVector<T>)> {
        self.value_count.set(self.value_count.get() + 1);
        self.gradient_count.set(self.gradient_count.get() + 1);
        self.inner.value_and_gradient(argument, indices)
    }

    fn hessian(&self, argument: &DVector<T>, indices: &[usize]) -> Result<DMatrix<T>> {
        self.hessian_count.set(self.hessian_count.get() + 1);
        self.inner.hessian(argument, indices)
    }
}
