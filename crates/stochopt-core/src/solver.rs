//! Core solver traits, state, and convergence control.
//!
//! This module provides the framework every iterative solver is built on.
//! A solver run moves through a small state machine:
//!
//! 1. **Configured**: parameters and objective are set; configuration is
//!    validated before the first iteration.
//! 2. **Running**: each iteration selects a batch, evaluates the objective,
//!    applies the update rule, and re-checks the stopping conditions.
//! 3. **Terminal**: `Converged` (a tolerance is met), `IterationLimit`
//!    (the cap is exhausted), or `NumericalFailure` (a non-finite value or
//!    gradient appeared; the offending iteration is recorded and the last
//!    finite iterate is preserved).
//!
//! Convergence is checked *before* every step, so a zero gradient at the
//! starting point converges with iteration count 0, and an iteration cap
//! of 0 returns the starting point unchanged.
//!
//! # Example
//!
//! ```rust,ignore
//! let criterion = StoppingCriterion::new()
//!     .with_max_iterations(1000)
//!     .with_gradient_tolerance(1e-7);
//! let result = solver.minimize(&objective, &x0, &criterion)?;
//! if result.converged {
//!     println!("minimum at {:?}", result.argument);
//! }
//! ```

use crate::{
    error::{SolverError, SolverResult},
    objective::ObjectiveFunction,
    types::{DVector, Scalar},
};
use num_traits::Float;
use std::fmt::Debug;
use std::time::Duration;

/// Reason a solver run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TerminationReason {
    /// A convergence tolerance was satisfied.
    Converged,
    /// The iteration cap was exhausted without convergence.
    IterationLimit,
    /// A non-finite value or gradient appeared at the recorded iteration.
    /// Never retried; the underlying cause is data- or
    /// configuration-dependent, not transient.
    NumericalFailure {
        /// Iteration at which the non-finite result was produced
        iteration: usize,
    },
}

/// Stopping conditions for a solver run.
///
/// Combines the iteration cap with the convergence tolerances: the
/// gradient-norm test `‖g‖ < ε_g` and the successive-value test
/// `|f(xₖ) − f(xₖ₋₁)| < ε_f`. A tolerance set to `None` is not checked.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StoppingCriterion<T: Scalar> {
    /// Maximum number of iterations (may be 0).
    pub max_iterations: usize,

    /// Tolerance for the gradient 2-norm.
    pub gradient_tolerance: Option<T>,

    /// Tolerance for the successive objective-value change.
    pub function_tolerance: Option<T>,
}

impl<T: Scalar> Default for StoppingCriterion<T> {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gradient_tolerance: Some(T::DEFAULT_GRADIENT_TOLERANCE),
            function_tolerance: Some(T::DEFAULT_FUNCTION_TOLERANCE),
        }
    }
}

impl<T: Scalar> StoppingCriterion<T> {
    /// Creates a stopping criterion with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the gradient-norm tolerance.
    pub fn with_gradient_tolerance(mut self, tol: T) -> Self {
        self.gradient_tolerance = Some(tol);
        self
    }

    /// Sets the successive-value tolerance.
    pub fn with_function_tolerance(mut self, tol: T) -> Self {
        self.function_tolerance = Some(tol);
        self
    }

    /// Disables the successive-value test.
    pub fn without_function_tolerance(mut self) -> Self {
        self.function_tolerance = None;
        self
    }

    /// Validates the criterion before a run starts.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a negative tolerance.
    pub fn validate(&self) -> Result<(), SolverError> {
        if let Some(tol) = self.gradient_tolerance {
            if tol < T::zero() {
                return Err(SolverError::invalid_configuration(
                    "must be non-negative",
                    "gradient_tolerance",
                    format!("{tol}"),
                ));
            }
        }
        if let Some(tol) = self.function_tolerance {
            if tol < T::zero() {
                return Err(SolverError::invalid_configuration(
                    "must be non-negative",
                    "function_tolerance",
                    format!("{tol}"),
                ));
            }
        }
        Ok(())
    }
}

/// Mutable per-run state owned by the solver engine.
///
/// Holds the current iterate, the latest evaluation outputs, and the
/// bookkeeping counters. Update-rule-specific memory (accumulators,
/// correction pairs, gradient tables) lives in the concrete solvers.
#[derive(Debug, Clone)]
pub struct SolverState<T: Scalar> {
    /// Current parameter vector.
    pub argument: DVector<T>,

    /// Objective value at `argument` (over the batch it was evaluated on).
    pub value: T,

    /// Latest gradient, if one has been computed.
    pub gradient: Option<DVector<T>>,

    /// 2-norm of the latest gradient.
    pub gradient_norm: Option<T>,

    /// Objective value at the previous iterate.
    pub previous_value: Option<T>,

    /// Iterations performed so far.
    pub iteration: usize,

    /// Number of objective value evaluations.
    pub function_evaluations: usize,

    /// Number of gradient evaluations.
    pub gradient_evaluations: usize,
}

impl<T: Scalar> SolverState<T> {
    /// Creates state for a fresh run starting at `argument`.
    pub fn new(argument: DVector<T>, value: T) -> Self {
        Self {
            argument,
            value,
            gradient: None,
            gradient_norm: None,
            previous_value: None,
            iteration: 0,
            function_evaluations: 0,
            gradient_evaluations: 0,
        }
    }

    /// Records the latest gradient and its norm.
    pub fn set_gradient(&mut self, gradient: DVector<T>, norm: T) {
        self.gradient = Some(gradient);
        self.gradient_norm = Some(norm);
    }

    /// Advances to the next iterate.
    pub fn update(&mut self, argument: DVector<T>, value: T) {
        self.previous_value = Some(self.value);
        self.argument = argument;
        self.value = value;
        self.iteration += 1;
    }
}

/// Stateless convergence test evaluated before every step.
#[derive(Debug)]
pub struct ConvergenceChecker;

impl ConvergenceChecker {
    /// Returns the termination reason when a stopping condition holds.
    ///
    /// Convergence tests run before the iteration-cap test so a start
    /// point that already satisfies a tolerance reports `Converged`.
    pub fn check<T: Scalar>(
        state: &SolverState<T>,
        criterion: &StoppingCriterion<T>,
    ) -> Option<TerminationReason> {
        if let (Some(tol), Some(norm)) = (criterion.gradient_tolerance, state.gradient_norm) {
            if norm <= tol {
                return Some(TerminationReason::Converged);
            }
        }
        if let (Some(tol), Some(previous)) = (criterion.function_tolerance, state.previous_value) {
            if <T as Float>::abs(state.value - previous) <= tol {
                return Some(TerminationReason::Converged);
            }
        }
        if state.iteration >= criterion.max_iterations {
            return Some(TerminationReason::IterationLimit);
        }
        None
    }
}

/// Returns true when the value and every gradient entry are finite.
pub fn evaluation_is_finite<T: Scalar>(value: T, gradient: &DVector<T>) -> bool {
    <T as Float>::is_finite(value) && gradient.iter().all(|g| <T as Float>::is_finite(*g))
}

/// Validates the starting point against the objective's dimension.
///
/// # Errors
///
/// `InvalidDimension` (wrapped in [`SolverError`]) when the lengths
/// disagree; detected before any state mutation.
pub fn validate_initial_argument<T, F>(
    objective: &F,
    initial: &DVector<T>,
) -> Result<(), SolverError>
where
    T: Scalar,
    F: ObjectiveFunction<T> + ?Sized,
{
    if initial.len() != objective.dimension() {
        return Err(SolverError::Objective(
            crate::error::ObjectiveError::invalid_dimension(
                format!("starting point of length {}", objective.dimension()),
                format!("starting point of length {}", initial.len()),
            ),
        ));
    }
    Ok(())
}

/// Outcome of a solver run.
///
/// Carries the final iterate and value, first-order diagnostics, the
/// counters, and the termination reason. On `NumericalFailure` the
/// argument is the last finite iterate, so partial progress survives.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult<T: Scalar> {
    /// The final parameter vector.
    pub argument: DVector<T>,

    /// The objective value at the final parameter vector.
    pub value: T,

    /// The gradient 2-norm at the final parameter vector (if computed).
    pub gradient_norm: Option<T>,

    /// Iterations actually performed (≤ the configured cap).
    pub iterations: usize,

    /// Total objective value evaluations.
    pub function_evaluations: usize,

    /// Total gradient evaluations.
    pub gradient_evaluations: usize,

    /// Wall-clock time elapsed during the run.
    pub duration: Duration,

    /// Why the run stopped.
    pub termination_reason: TerminationReason,

    /// True when a convergence tolerance was satisfied.
    pub converged: bool,
}

impl<T: Scalar> OptimizationResult<T> {
    /// Creates a new result.
    pub fn new(
        argument: DVector<T>,
        value: T,
        iterations: usize,
        duration: Duration,
        termination_reason: TerminationReason,
    ) -> Self {
        let converged = matches!(termination_reason, TerminationReason::Converged);
        Self {
            argument,
            value,
            gradient_norm: None,
            iterations,
            function_evaluations: 0,
            gradient_evaluations: 0,
            duration,
            termination_reason,
            converged,
        }
    }

    /// Sets the gradient norm at the final point.
    pub fn with_gradient_norm(mut self, norm: T) -> Self {
        self.gradient_norm = Some(norm);
        self
    }

    /// Sets the function evaluation count.
    pub fn with_function_evaluations(mut self, count: usize) -> Self {
        self.function_evaluations = count;
        self
    }

    /// Sets the gradient evaluation count.
    pub fn with_gradient_evaluations(mut self, count: usize) -> Self {
        self.gradient_evaluations = count;
        self
    }

    /// Builds a result from the final solver state.
    pub fn from_state(
        state: SolverState<T>,
        duration: Duration,
        termination_reason: TerminationReason,
    ) -> Self {
        let gradient_norm = state.gradient_norm;
        let mut result = Self::new(
            state.argument,
            state.value,
            state.iteration,
            duration,
            termination_reason,
        )
        .with_function_evaluations(state.function_evaluations)
        .with_gradient_evaluations(state.gradient_evaluations);
        result.gradient_norm = gradient_norm;
        result
    }

    /// True when the run stopped on a non-finite evaluation.
    pub fn is_numerical_failure(&self) -> bool {
        matches!(
            self.termination_reason,
            TerminationReason::NumericalFailure { .. }
        )
    }
}

/// Universal interface for the iterative solvers.
///
/// A solver owns its update-rule state (momentum, accumulators,
/// correction pairs, gradient tables) and its batch cursor, and keeps
/// them across `minimize` calls: invoking `minimize` again with a
/// previous result's argument continues the run exactly where it
/// stopped. Call [`reset`](Self::reset) to discard retained state.
pub trait IterativeSolver<T: Scalar>: Debug {
    /// Human-readable algorithm name for diagnostics.
    fn name(&self) -> &str;

    /// Minimizes the objective starting from `initial`.
    ///
    /// Configuration and shape problems are reported as errors before any
    /// iteration runs; non-finite evaluations terminate the run with a
    /// [`TerminationReason::NumericalFailure`] inside an `Ok` result.
    fn minimize<F>(
        &mut self,
        objective: &F,
        initial: &DVector<T>,
        criterion: &StoppingCriterion<T>,
    ) -> SolverResult<OptimizationResult<T>>
    where
        F: ObjectiveFunction<T> + ?Sized;

    /// Discards retained rule state and batch position.
    fn reset(&mut self);
}
