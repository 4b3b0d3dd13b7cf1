//! Stochastic gradient descent solver.
//!
//! This module implements mini-batch SGD, the baseline first-order
//! solver. Each iteration draws a batch of observation indices, evaluates
//! the batch gradient, and steps against it:
//!
//! ```text
//! x_{k+1} = x_k − α_k · g_k
//! ```
//!
//! # Features
//!
//! - **Learning-rate scheduling**: constant, per-iteration table, and the
//!   standard decay formulas
//! - **Momentum methods**: classical momentum and Nesterov acceleration
//! - **Conservative inner iterations**: repeats the update a fixed number
//!   of times per outer iteration, scaling each repeat by a coefficient
//!   sequence, which bounds how far one batch may move the iterate
//! - **Batch processing**: full-batch, sequential mini-batch, or
//!   seeded-shuffle mini-batch selection

use std::time::Instant;
use stochopt_core::{
    batch::{BatchOrder, BatchSelector},
    error::{SolverError, SolverResult},
    objective::ObjectiveFunction,
    schedule::LearningRateSchedule,
    solver::{
        evaluation_is_finite, validate_initial_argument, ConvergenceChecker, IterativeSolver,
        OptimizationResult, SolverState, StoppingCriterion, TerminationReason,
    },
    types::{DVector, Scalar},
};

/// Momentum method for SGD.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MomentumMethod<T>
where
    T: Scalar,
{
    /// No momentum
    None,

    /// Classical momentum: v_k = beta*v_{k-1} + g_k
    Classical {
        /// Momentum coefficient beta in [0, 1)
        coefficient: T,
    },

    /// Nesterov accelerated gradient
    Nesterov {
        /// Momentum coefficient beta in [0, 1)
        coefficient: T,
    },
}

impl<T: Scalar> MomentumMethod<T> {
    fn coefficient(&self) -> Option<T> {
        match self {
            Self::None => None,
            Self::Classical { coefficient } | Self::Nesterov { coefficient } => Some(*coefficient),
        }
    }
}

/// Configuration for the SGD solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SgdConfig<T>
where
    T: Scalar,
{
    /// Learning-rate schedule
    pub learning_rate: LearningRateSchedule<T>,

    /// Momentum method
    pub momentum: MomentumMethod<T>,

    /// Batch size per iteration (None = full batch)
    pub batch_size: Option<usize>,

    /// Batch ordering policy
    pub batch_order: BatchOrder,

    /// Inner updates per outer iteration (used with the conservative
    /// sequence; 1 = plain SGD)
    pub inner_iterations: usize,

    /// Per-inner-iteration step-scaling coefficients; indices beyond the
    /// sequence length reuse the last entry
    pub conservative_sequence: Option<Vec<T>>,
}

impl<T> Default for SgdConfig<T>
where
    T: Scalar,
{
    fn default() -> Self {
        Self {
            learning_rate: LearningRateSchedule::Constant(<T as Scalar>::from_f64(0.01)),
            momentum: MomentumMethod::None,
            batch_size: None,
            batch_order: BatchOrder::Sequential,
            inner_iterations: 1,
            conservative_sequence: None,
        }
    }
}

impl<T> SgdConfig<T>
where
    T: Scalar,
{
    /// Creates a new SGD configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the learning-rate schedule.
    pub fn with_learning_rate(mut self, schedule: LearningRateSchedule<T>) -> Self {
        self.learning_rate = schedule;
        self
    }

    /// Sets a constant learning rate.
    pub fn with_constant_learning_rate(mut self, rate: T) -> Self {
        self.learning_rate = LearningRateSchedule::Constant(rate);
        self
    }

    /// Sets momentum method.
    pub fn with_momentum(mut self, momentum: MomentumMethod<T>) -> Self {
        self.momentum = momentum;
        self
    }

    /// Sets classical momentum.
    pub fn with_classical_momentum(mut self, coefficient: T) -> Self {
        self.momentum = MomentumMethod::Classical { coefficient };
        self
    }

    /// Sets Nesterov momentum.
    pub fn with_nesterov_momentum(mut self, coefficient: T) -> Self {
        self.momentum = MomentumMethod::Nesterov { coefficient };
        self
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Sets the batch ordering policy.
    pub fn with_batch_order(mut self, order: BatchOrder) -> Self {
        self.batch_order = order;
        self
    }

    /// Enables conservative inner iterations with the given coefficients.
    pub fn with_conservative_sequence(
        mut self,
        inner_iterations: usize,
        coefficients: Vec<T>,
    ) -> Self {
        self.inner_iterations = inner_iterations;
        self.conservative_sequence = Some(coefficients);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a non-positive learning rate, a momentum
    /// coefficient outside `[0, 1)`, zero inner iterations, or an empty or
    /// non-positive conservative sequence.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.learning_rate.is_positive() {
            return Err(SolverError::invalid_configuration(
                "every rate must be positive",
                "learning_rate",
                format!("{:?}", self.learning_rate),
            ));
        }
        if let Some(beta) = self.momentum.coefficient() {
            if beta < T::zero() || beta >= T::one() {
                return Err(SolverError::invalid_configuration(
                    "must lie in [0, 1)",
                    "momentum",
                    format!("{beta}"),
                ));
            }
        }
        if self.inner_iterations == 0 {
            return Err(SolverError::invalid_configuration(
                "must be at least 1",
                "inner_iterations",
                "0",
            ));
        }
        if let Some(coefficients) = &self.conservative_sequence {
            if coefficients.is_empty() || coefficients.iter().any(|c| *c <= T::zero()) {
                return Err(SolverError::invalid_configuration(
                    "must be non-empty with positive entries",
                    "conservative_sequence",
                    format!("{coefficients:?}"),
                ));
            }
        }
        Ok(())
    }
}

/// Mini-batch stochastic gradient descent solver.
///
/// Momentum state and the batch cursor survive across `minimize` calls:
/// running the solver twice for `k` iterations each reproduces one
/// uninterrupted `2k`-iteration run. The learning-rate schedule is
/// indexed by the accumulated iteration count, so a resumed run keeps
/// decaying where it left off.
///
/// # Examples
///
/// ```rust,ignore
/// let mut sgd = Sgd::new(
///     SgdConfig::new()
///         .with_constant_learning_rate(0.05)
///         .with_batch_size(32)
///         .with_classical_momentum(0.9),
/// );
/// let result = sgd.minimize(&objective, &x0, &criterion)?;
/// ```
#[derive(Debug)]
pub struct Sgd<T>
where
    T: Scalar,
{
    config: SgdConfig<T>,
    selector: Option<BatchSelector>,
    momentum: Option<DVector<T>>,
    total_iterations: usize,
}

impl<T> Sgd<T>
where
    T: Scalar,
{
    /// Creates a new SGD solver with the given configuration.
    pub fn new(config: SgdConfig<T>) -> Self {
        Self {
            config,
            selector: None,
            momentum: None,
            total_iterations: 0,
        }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &SgdConfig<T> {
        &self.config
    }

    /// Iterations accumulated over all `minimize` calls since the last
    /// reset.
    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    /// Takes the retained batch selector, or builds one when the problem
    /// shape changed since the previous run.
    fn take_selector<F>(&mut self, objective: &F) -> Result<BatchSelector, SolverError>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        let n = objective.num_observations();
        let size = self.config.batch_size.unwrap_or(n);
        match self.selector.take() {
            Some(selector)
                if selector.num_observations() == n && selector.batch_size() == size =>
            {
                Ok(selector)
            }
            _ => BatchSelector::new(n, size, self.config.batch_order),
        }
    }

    /// Computes the descent direction, updating momentum state.
    fn search_direction(&mut self, gradient: &DVector<T>) -> DVector<T> {
        match &self.config.momentum {
            MomentumMethod::None => -gradient,
            MomentumMethod::Classical { coefficient } => {
                let velocity = match self.momentum.take() {
                    Some(previous) if previous.len() == gradient.len() => {
                        previous * *coefficient + gradient
                    }
                    _ => gradient.clone(),
                };
                self.momentum = Some(velocity.clone());
                -velocity
            }
            MomentumMethod::Nesterov { coefficient } => {
                let velocity = match self.momentum.take() {
                    Some(previous) if previous.len() == gradient.len() => {
                        previous * *coefficient + gradient
                    }
                    _ => gradient.clone(),
                };
                // Lookahead direction: beta*v_k + g_k.
                let direction = &velocity * *coefficient + gradient;
                self.momentum = Some(velocity);
                -direction
            }
        }
    }

    /// Applies the scheduled step, repeating it through the conservative
    /// inner loop when one is configured.
    fn apply_step(&self, argument: &DVector<T>, direction: &DVector<T>, rate: T) -> DVector<T> {
        match &self.config.conservative_sequence {
            Some(coefficients) => {
                let mut next = argument.clone();
                for inner in 0..self.config.inner_iterations {
                    let scale = coefficients[inner.min(coefficients.len() - 1)];
                    next += direction * (rate * scale);
                }
                next
            }
            None => argument + direction * rate,
        }
    }

    fn run_loop<F>(
        &mut self,
        objective: &F,
        initial: &DVector<T>,
        criterion: &StoppingCriterion<T>,
        selector: &mut BatchSelector,
    ) -> SolverResult<OptimizationResult<T>>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        let start_time = Instant::now();
        let mut state = SolverState::new(initial.clone(), T::zero());

        loop {
            if state.iteration >= criterion.max_iterations {
                return Ok(OptimizationResult::from_state(
                    state,
                    start_time.elapsed(),
                    TerminationReason::IterationLimit,
                ));
            }

            let indices = selector.next_batch();
            let (value, gradient) = objective.value_and_gradient(&state.argument, &indices)?;
            state.function_evaluations += 1;
            state.gradient_evaluations += 1;

            if !evaluation_is_finite(value, &gradient) {
                let iteration = state.iteration;
                return Ok(OptimizationResult::from_state(
                    state,
                    start_time.elapsed(),
                    TerminationReason::NumericalFailure { iteration },
                ));
            }

            state.value = value;
            let norm = gradient.norm();
            state.set_gradient(gradient.clone(), norm);

            if let Some(reason) = ConvergenceChecker::check(&state, criterion) {
                return Ok(OptimizationResult::from_state(
                    state,
                    start_time.elapsed(),
                    reason,
                ));
            }

            let direction = self.search_direction(&gradient);
            let rate = self.config.learning_rate.rate_at(self.total_iterations);
            let next = self.apply_step(&state.argument, &direction, rate);
            state.update(next, value);
            self.total_iterations += 1;
        }
    }
}

impl<T> IterativeSolver<T> for Sgd<T>
where
    T: Scalar,
{
    fn name(&self) -> &str {
        "SGD"
    }

    fn minimize<F>(
        &mut self,
        objective: &F,
        initial: &DVector<T>,
        criterion: &StoppingCriterion<T>,
    ) -> SolverResult<OptimizationResult<T>>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        self.config.validate()?;
        criterion.validate()?;
        validate_initial_argument(objective, initial)?;

        let mut selector = self.take_selector(objective)?;
        let result = self.run_loop(objective, initial, criterion, &mut selector);
        self.selector = Some(selector);
        result
    }

    fn reset(&mut self) {
        self.selector = None;
        self.momentum = None;
        self.total_iterations = 0;
    }
}
