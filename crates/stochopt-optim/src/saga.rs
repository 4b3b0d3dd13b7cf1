//! SAGA variance-reduced stochastic solver.
//!
//! SAGA keeps one stored gradient per observation. When observation `i`
//! is sampled, the update direction replaces the plain stochastic
//! gradient with
//!
//! ```text
//! d = g_i(x_k) − stored[i] + (1/n)·Σ_j stored[j]
//! ```
//!
//! which is an unbiased gradient estimate whose variance shrinks as the
//! table fills with recent gradients. After the direction is formed the
//! table entry and the running sum are updated with `g_i(x_k)`.
//!
//! The table is initialized to zero, so early iterations behave like
//! plain SGD damped by the (initially zero) average term. Mini-batches
//! average the per-observation corrections over the batch.

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

/// Configuration for the SAGA solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SagaConfig<T>
where
    T: Scalar,
{
    /// Learning-rate schedule
    pub learning_rate: LearningRateSchedule<T>,

    /// Batch size per iteration (defaults to 1, the classical setting)
    pub batch_size: usize,

    /// Batch ordering policy
    pub batch_order: BatchOrder,
}

impl<T> Default for SagaConfig<T>
where
    T: Scalar,
{
    fn default() -> Self {
        Self {
            learning_rate: LearningRateSchedule::Constant(<T as Scalar>::from_f64(0.01)),
            batch_size: 1,
            batch_order: BatchOrder::Sequential,
        }
    }
}

impl<T> SagaConfig<T>
where
    T: Scalar,
{
    /// Creates a new SAGA configuration with default parameters.
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

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
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
    /// `InvalidConfiguration` for a non-positive learning rate.
    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.learning_rate.is_positive() {
            return Err(SolverError::invalid_configuration(
                "every rate must be positive",
                "learning_rate",
                format!("{:?}", self.learning_rate),
            ));
        }
        Ok(())
    }
}

/// Per-observation gradient memory.
#[derive(Debug, Clone)]
struct GradientTable<T: Scalar> {
    stored: Vec<DVector<T>>,
    sum: DVector<T>,
}

impl<T: Scalar> GradientTable<T> {
    fn zeros(num_observations: usize, dimension: usize) -> Self {
        Self {
            stored: vec![DVector::zeros(dimension); num_observations],
            sum: DVector::zeros(dimension),
        }
    }

    fn matches(&self, num_observations: usize, dimension: usize) -> bool {
        self.stored.len() == num_observations && self.sum.len() == dimension
    }

    fn mean(&self) -> DVector<T> {
        &self.sum * (T::one() / <T as Scalar>::from_usize(self.stored.len()))
    }

    /// Replaces the stored gradient for one observation, keeping the
    /// running sum consistent.
    fn replace(&mut self, index: usize, gradient: DVector<T>) {
        self.sum -= &self.stored[index];
        self.sum += &gradient;
        self.stored[index] = gradient;
    }
}

/// SAGA solver.
///
/// The stored-gradient table, its running sum, and the batch cursor
/// survive across `minimize` calls. [`reset`](IterativeSolver::reset)
/// zeroes the table again.
#[derive(Debug)]
pub struct Saga<T>
where
    T: Scalar,
{
    config: SagaConfig<T>,
    selector: Option<BatchSelector>,
    table: Option<GradientTable<T>>,
    total_iterations: usize,
}

impl<T> Saga<T>
where
    T: Scalar,
{
    /// Creates a new SAGA solver with the given configuration.
    pub fn new(config: SagaConfig<T>) -> Self {
        Self {
            config,
            selector: None,
            table: None,
            total_iterations: 0,
        }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &SagaConfig<T> {
        &self.config
    }

    /// The stored gradient for one observation, if a run has started.
    pub fn stored_gradient(&self, index: usize) -> Option<&DVector<T>> {
        self.table.as_ref().and_then(|table| table.stored.get(index))
    }

    fn take_selector<F>(&mut self, objective: &F) -> Result<BatchSelector, SolverError>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        let n = objective.num_observations();
        match self.selector.take() {
            Some(selector)
                if selector.num_observations() == n
                    && selector.batch_size() == self.config.batch_size =>
            {
                Ok(selector)
            }
            _ => BatchSelector::new(n, self.config.batch_size, self.config.batch_order),
        }
    }

    fn take_table<F>(&mut self, objective: &F) -> GradientTable<T>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        let n = objective.num_observations();
        let d = objective.dimension();
        match self.table.take() {
            Some(table) if table.matches(n, d) => table,
            _ => GradientTable::zeros(n, d),
        }
    }

    /// Variance-reduced direction over one batch, updating the table.
    fn variance_reduced_direction<F>(
        &self,
        objective: &F,
        table: &mut GradientTable<T>,
        argument: &DVector<T>,
        indices: &[usize],
    ) -> SolverResult<DVector<T>>
    where
        F: ObjectiveFunction<T> + ?Sized,
    {
        let mean = table.mean();
        let inv_batch = T::one() / <T as Scalar>::from_usize(indices.len());
        let mut direction = DVector::zeros(argument.len());

        for &i in indices {
            let fresh = objective.gradient(argument, &[i])?;
            direction += &fresh - &table.stored[i];
            table.replace(i, fresh);
        }
        Ok(direction * inv_batch + mean)
    }

    fn run_loop<F>(
        &mut self,
        objective: &F,
        initial: &DVector<T>,
        criterion: &StoppingCriterion<T>,
        selector: &mut BatchSelector,
        table: &mut GradientTable<T>,
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

            let direction =
                self.variance_reduced_direction(objective, table, &state.argument, &indices)?;
            state.gradient_evaluations += indices.len();

            if !evaluation_is_finite(value, &direction) {
                let iteration = state.iteration;
                return Ok(OptimizationResult::from_state(
                    state,
                    start_time.elapsed(),
                    TerminationReason::NumericalFailure { iteration },
                ));
            }

            let rate = self.config.learning_rate.rate_at(self.total_iterations);
            let next = &state.argument - direction * rate;
            state.update(next, value);
            self.total_iterations += 1;
        }
    }
}

impl<T> IterativeSolver<T> for Saga<T>
where
    T: Scalar,
{
    fn name(&self) -> &str {
        "SAGA"
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
        let mut table = self.take_table(objective);
        let result = self.run_loop(objective, initial, criterion, &mut selector, &mut table);
        self.selector = Some(selector);
        self.table = Some(table);
        result
    }

    fn reset(&mut self) {
        self.selector = None;
        self.table = None;
        self.total_iterations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stochopt_core::dataset::Dataset;
    use stochopt_core::objective::MseObjective;
    use stochopt_core::types::DMatrix;

    fn criterion(max_iterations: usize) -> StoppingCriterion<f64> {
        StoppingCriterion::new()
            .with_max_iterations(max_iterations)
            .with_gradient_tolerance(1e-9)
            .without_function_tolerance()
    }

    fn line_objective() -> MseObjective<f64> {
        // y = 1 + 2x, exactly
        let features = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let responses = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0]);
        MseObjective::new(Dataset::new(features, responses).unwrap())
    }

    #[test]
    fn test_saga_creation() {
        let solver = Saga::new(SagaConfig::<f64>::new());
        assert_eq!(solver.name(), "SAGA");
        assert!(solver.stored_gradient(0).is_none());
    }

    #[test]
    fn test_table_starts_at_zero() {
        let objective = line_objective();
        let initial = DVector::zeros(2);
        let mut solver = Saga::new(SagaConfig::new().with_constant_learning_rate(0.01));

        // One iteration: table holds the gradient of the first sampled
        // observation; the untouched entries are still zero.
        let _ = solver
            .minimize(&objective, &initial, &criterion(1))
            .unwrap();
        let untouched = solver.stored_gradient(3).unwrap();
        assert_relative_eq!(untouched.norm(), 0.0);
        let touched = solver.stored_gradient(0).unwrap();
        assert!(touched.norm() > 0.0);
    }

    #[test]
    fn test_first_direction_matches_plain_stochastic_gradient() {
        // With a zero table the correction and average both vanish, so
        // the first step is exactly SGD on the sampled observation.
        let objective = line_objective();
        let initial = DVector::zeros(2);
        let mut solver = Saga::new(SagaConfig::new().with_constant_learning_rate(0.1));

        let result = solver
            .minimize(&objective, &initial, &criterion(1))
            .unwrap();
        let g = objective.gradient(&initial, &[0]).unwrap();
        let expected = &initial - g * 0.1;
        assert_relative_eq!(result.argument, expected, epsilon = 1e-14);
    }

    #[test]
    fn test_converges_on_least_squares() {
        let objective = line_objective();
        let initial = DVector::zeros(2);
        let mut solver = Saga::new(SagaConfig::new().with_constant_learning_rate(0.01));

        let result = solver
            .minimize(&objective, &initial, &criterion(20_000))
            .unwrap();
        assert_relative_eq!(result.argument[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.argument[1], 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_running_sum_tracks_table() {
        let objective = line_objective();
        let initial = DVector::from_vec(vec![0.5, -0.5]);
        let mut solver = Saga::new(SagaConfig::new().with_constant_learning_rate(0.02));

        let _ = solver
            .minimize(&objective, &initial, &criterion(9))
            .unwrap();

        let table = solver.table.as_ref().unwrap();
        let mut sum = DVector::zeros(2);
        for stored in &table.stored {
            sum += stored;
        }
        assert_relative_eq!(sum, table.sum, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_zeroes_table() {
        let objective = line_objective();
        let initial = DVector::zeros(2);
        let mut solver = Saga::new(SagaConfig::new().with_constant_learning_rate(0.05));

        let a = solver
            .minimize(&objective, &initial, &criterion(7))
            .unwrap();
        solver.reset();
        assert!(solver.stored_gradient(0).is_none());

        let b = solver
            .minimize(&objective, &initial, &criterion(7))
            .unwrap();
        assert_relative_eq!(a.argument, b.argument, epsilon = 1e-14);
    }
}
