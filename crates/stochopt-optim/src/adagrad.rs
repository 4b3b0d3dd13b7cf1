//! Adagrad solver with per-coordinate adaptive learning rates.
//!
//! Adagrad accumulates the element-wise square of every gradient it has
//! seen and divides the step for each coordinate by the square root of
//! that running sum:
//!
//! ```text
//! a_{k+1} = a_k + g_k ⊙ g_k
//! x_{k+1}[i] = x_k[i] − α_k · g_k[i] / (√a_{k+1}[i] + ε)
//! ```
//!
//! The accumulator is non-decreasing per coordinate, so the effective
//! per-coordinate step size never grows over a run. The small `ε`
//! stabilizes coordinates whose accumulated gradient is still near zero.

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

use num_traits::Float;

/// Configuration for the Adagrad solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdagradConfig<T>
where
    T: Scalar,
{
    /// Learning-rate schedule
    pub learning_rate: LearningRateSchedule<T>,

    /// Stabilizing constant added to the accumulator square root
    pub epsilon: T,

    /// Batch size per iteration (None = full batch)
    pub batch_size: Option<usize>,

    /// Batch ordering policy
    pub batch_order: BatchOrder,
}

impl<T> Default for AdagradConfig<T>
where
    T: Scalar,
{
    fn default() -> Self {
        Self {
            learning_rate: LearningRateSchedule::Constant(<T as Scalar>::from_f64(0.01)),
            epsilon: T::ADAPTIVE_EPSILON,
            batch_size: None,
            batch_order: BatchOrder::Sequential,
        }
    }
}

impl<T> AdagradConfig<T>
where
    T: Scalar,
{
    /// Creates a new Adagrad configuration with default parameters.
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

    /// Sets the stabilizing epsilon.
    pub fn with_epsilon(mut self, epsilon: T) -> Self {
        self.epsilon = epsilon;
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

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a non-positive learning rate or a
    /// non-positive epsilon.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.learning_rate.is_positive() {
            return Err(SolverError::invalid_configuration(
                "every rate must be positive",
                "learning_rate",
                format!("{:?}", self.learning_rate),
            ));
        }
        if self.epsilon <= T::zero() {
            return Err(SolverError::invalid_configuration(
                "must be positive",
                "epsilon",
                format!("{}", self.epsilon),
            ));
        }
        Ok(())
    }
}

/// Adagrad solver.
///
/// The squared-gradient accumulator and the batch cursor survive across
/// `minimize` calls, so a resumed run keeps the adapted per-coordinate
/// rates it had already learned. [`reset`](IterativeSolver::reset)
/// discards them.
#[derive(Debug)]
pub struct Adagrad<T>
where
    T: Scalar,
{
    config: AdagradConfig<T>,
    selector: Option<BatchSelector>,
    accumulator: Option<DVector<T>>,
    total_iterations: usize,
}

impl<T> Adagrad<T>
where
    T: Scalar,
{
    /// Creates a new Adagrad solver with the given configuration.
    pub fn new(config: AdagradConfig<T>) -> Self {
        Self {
            config,
            selector: None,
            accumulator: None,
            total_iterations: 0,
        }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &AdagradConfig<T> {
        &self.config
    }

    /// The squared-gradient accumulator, once at least one iteration ran.
    pub fn accumulator(&self) -> Option<&DVector<T>> {
        self.accumulator.as_ref()
    }

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

    /// Folds the gradient into the accumulator and returns the adapted
    /// step direction.
    fn adapted_step(&mut self, gradient: &DVector<T>, rate: T) -> DVector<T> {
        let d = gradient.len();
        let mut accumulator = match self.accumulator.take() {
            Some(a) if a.len() == d => a,
            _ => DVector::zeros(d),
        };

        let mut step = DVector::zeros(d);
        for i in 0..d {
            accumulator[i] += gradient[i] * gradient[i];
            step[i] =
                -rate * gradient[i] / (<T as Float>::sqrt(accumulator[i]) + self.config.epsilon);
        }
        self.accumulator = Some(accumulator);
        step
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

            let rate = self.config.learning_rate.rate_at(self.total_iterations);
            let step = self.adapted_step(&gradient, rate);
            let next = &state.argument + step;
            state.update(next, value);
            self.total_iterations += 1;
        }
    }
}

impl<T> IterativeSolver<T> for Adagrad<T>
where
    T: Scalar,
{
    fn name(&self) -> &str {
        "Adagrad"
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
        self.accumulator = None;
        self.total_iterations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stochopt_core::objective::QuadraticObjective;

    fn criterion(max_iterations: usize) -> StoppingCriterion<f64> {
        StoppingCriterion::new()
            .with_max_iterations(max_iterations)
            .with_gradient_tolerance(1e-8)
            .without_function_tolerance()
    }

    #[test]
    fn test_adagrad_creation() {
        let solver = Adagrad::new(AdagradConfig::<f64>::new().with_constant_learning_rate(0.1));
        assert_eq!(solver.name(), "Adagrad");
        assert!(solver.accumulator().is_none());
    }

    #[test]
    fn test_invalid_epsilon_rejected() {
        assert!(AdagradConfig::<f64>::new()
            .with_epsilon(0.0)
            .validate()
            .is_err());
        assert!(AdagradConfig::<f64>::new()
            .with_constant_learning_rate(-0.1)
            .validate()
            .is_err());
    }

    #[test]
    fn test_converges_on_quadratic() {
        let objective = QuadraticObjective::<f64>::isotropic(2);
        let initial = DVector::from_vec(vec![1.0, -1.0]);
        let mut solver = Adagrad::new(AdagradConfig::new().with_constant_learning_rate(0.5));

        let result = solver
            .minimize(&objective, &initial, &criterion(2000))
            .unwrap();
        assert!(result.value < 1e-6);
        assert!(result.iterations <= 2000);
    }

    #[test]
    fn test_accumulator_is_monotone() {
        let objective = QuadraticObjective::<f64>::isotropic(3);
        let mut current = DVector::from_vec(vec![1.0, 2.0, -3.0]);
        let mut solver = Adagrad::new(AdagradConfig::new().with_constant_learning_rate(0.1));

        let mut previous = DVector::zeros(3);
        for _ in 0..10 {
            let result = solver
                .minimize(&objective, &current, &criterion(1))
                .unwrap();
            current = result.argument;

            let accumulator = solver.accumulator().unwrap();
            for i in 0..3 {
                assert!(accumulator[i] >= previous[i]);
            }
            previous = accumulator.clone();
        }
    }

    #[test]
    fn test_effective_rate_shrinks() {
        // Repeated identical gradients make each step strictly smaller.
        let objective = QuadraticObjective::<f64>::isotropic(1);
        let start = DVector::from_vec(vec![100.0]);
        let mut solver = Adagrad::new(AdagradConfig::new().with_constant_learning_rate(1.0));

        let first = solver.minimize(&objective, &start, &criterion(1)).unwrap();
        let first_step = (start[0] - first.argument[0]).abs();
        let second = solver
            .minimize(&objective, &first.argument, &criterion(1))
            .unwrap();
        let second_step = (first.argument[0] - second.argument[0]).abs();
        assert!(second_step < first_step);
    }

    #[test]
    fn test_reset_clears_accumulator() {
        let objective = QuadraticObjective::<f64>::isotropic(2);
        let initial = DVector::from_vec(vec![1.0, 1.0]);
        let mut solver = Adagrad::new(AdagradConfig::new().with_constant_learning_rate(0.1));

        let _ = solver
            .minimize(&objective, &initial, &criterion(5))
            .unwrap();
        assert!(solver.accumulator().is_some());

        solver.reset();
        assert!(solver.accumulator().is_none());

        let a = solver
            .minimize(&objective, &initial, &criterion(5))
            .unwrap();
        solver.reset();
        let b = solver
            .minimize(&objective, &initial, &criterion(5))
            .unwrap();
        assert_relative_eq!(a.argument, b.argument, epsilon = 1e-14);
    }
}
