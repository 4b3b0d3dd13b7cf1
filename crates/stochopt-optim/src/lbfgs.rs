//! Limited-memory BFGS solver.
//!
//! L-BFGS approximates the inverse Hessian from the last `m` correction
//! pairs `(s_k, y_k)` with `s_k = x_k − x_{k−1}` and `y_k = g_k − g_{k−1}`,
//! and computes the quasi-Newton direction with the standard two-loop
//! recursion. Storage is a bounded FIFO: once `m` pairs are held, adding
//! a new pair evicts the oldest, so memory stays `O(m·d)` for any run
//! length.
//!
//! Pairs are added cautiously: a pair whose curvature `yᵀs` is not
//! sufficiently positive is skipped, which keeps the implicit inverse
//! Hessian positive definite on non-convex or noisy batch objectives.

use std::collections::VecDeque;
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

/// One stored correction pair with its precomputed curvature inverse.
#[derive(Debug, Clone)]
pub struct CorrectionPair<T: Scalar> {
    /// Position delta `s_k = x_k − x_{k−1}`
    pub s: DVector<T>,
    /// Gradient delta `y_k = g_k − g_{k−1}`
    pub y: DVector<T>,
    /// Curvature inverse `ρ_k = 1 / yᵀs`
    pub rho: T,
}

/// Configuration for the L-BFGS solver.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LbfgsConfig<T>
where
    T: Scalar,
{
    /// Number of correction pairs to retain
    pub memory_size: usize,

    /// Learning-rate schedule scaling the quasi-Newton direction
    pub learning_rate: LearningRateSchedule<T>,

    /// Batch size per iteration (None = full batch)
    pub batch_size: Option<usize>,

    /// Batch ordering policy
    pub batch_order: BatchOrder,
}

impl<T> Default for LbfgsConfig<T>
where
    T: Scalar,
{
    fn default() -> Self {
        Self {
            memory_size: 10,
            learning_rate: LearningRateSchedule::Constant(T::one()),
            batch_size: None,
            batch_order: BatchOrder::Sequential,
        }
    }
}

impl<T> LbfgsConfig<T>
where
    T: Scalar,
{
    /// Creates a new L-BFGS configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retained correction pairs.
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
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
    /// `InvalidConfiguration` when `memory_size` is zero or the learning
    /// rate is not positive.
    pub fn validate(&self) -> Result<(), SolverError> {
        if self.memory_size == 0 {
            return Err(SolverError::invalid_configuration(
                "must be at least 1",
                "memory_size",
                "0",
            ));
        }
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

/// Limited-memory BFGS solver.
///
/// The correction-pair history, the previous iterate and gradient, and
/// the batch cursor survive across `minimize` calls, so a resumed run
/// continues with the curvature information it had already collected.
#[derive(Debug)]
pub struct Lbfgs<T>
where
    T: Scalar,
{
    config: LbfgsConfig<T>,
    selector: Option<BatchSelector>,
    pairs: VecDeque<CorrectionPair<T>>,
    previous: Option<(DVector<T>, DVector<T>)>,
    total_iterations: usize,
}

impl<T> Lbfgs<T>
where
    T: Scalar,
{
    /// Creates a new L-BFGS solver with the given configuration.
    pub fn new(config: LbfgsConfig<T>) -> Self {
        Self {
            config,
            selector: None,
            pairs: VecDeque::new(),
            previous: None,
            total_iterations: 0,
        }
    }

    /// Returns the solver configuration.
    pub fn config(&self) -> &LbfgsConfig<T> {
        &self.config
    }

    /// The stored correction pairs, oldest first.
    pub fn correction_pairs(&self) -> &VecDeque<CorrectionPair<T>> {
        &self.pairs
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

    /// Discards retained curvature state when the problem dimension
    /// changed since the previous run.
    fn reconcile_dimension(&mut self, dimension: usize) {
        let stale = self
            .previous
            .as_ref()
            .is_some_and(|(x, _)| x.len() != dimension)
            || self.pairs.front().is_some_and(|p| p.s.len() != dimension);
        if stale {
            self.pairs.clear();
            self.previous = None;
        }
    }

    /// Computes `−H_k·g_k` with the two-loop recursion.
    ///
    /// Falls back to steepest descent while no pair is stored.
    fn two_loop_direction(&self, gradient: &DVector<T>) -> DVector<T> {
        let Some(newest) = self.pairs.back() else {
            return -gradient;
        };

        let mut q = gradient.clone();
        let mut alphas = Vec::with_capacity(self.pairs.len());
        for pair in self.pairs.iter().rev() {
            let alpha = pair.rho * pair.s.dot(&q);
            q -= &pair.y * alpha;
            alphas.push(alpha);
        }

        // Initial inverse-Hessian scaling from the newest pair.
        let gamma = newest.s.dot(&newest.y) / newest.y.dot(&newest.y);
        q *= gamma;

        for (pair, alpha) in self.pairs.iter().zip(alphas.iter().rev()) {
            let beta = pair.rho * pair.y.dot(&q);
            q += &pair.s * (*alpha - beta);
        }
        -q
    }

    /// Records a correction pair from the latest step, skipping pairs
    /// whose curvature is not sufficiently positive.
    fn push_pair(&mut self, argument: &DVector<T>, gradient: &DVector<T>) {
        if let Some((previous_argument, previous_gradient)) = &self.previous {
            let s = argument - previous_argument;
            let y = gradient - previous_gradient;
            let curvature = y.dot(&s);
            if curvature > T::CURVATURE_THRESHOLD {
                if self.pairs.len() == self.config.memory_size {
                    self.pairs.pop_front();
                }
                self.pairs.push_back(CorrectionPair {
                    s,
                    y,
                    rho: T::one() / curvature,
                });
            }
        }
        self.previous = Some((argument.clone(), gradient.clone()));
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

            self.push_pair(&state.argument, &gradient);
            let direction = self.two_loop_direction(&gradient);
            let rate = self.config.learning_rate.rate_at(self.total_iterations);
            let next = &state.argument + direction * rate;
            state.update(next, value);
            self.total_iterations += 1;
        }
    }
}

impl<T> IterativeSolver<T> for Lbfgs<T>
where
    T: Scalar,
{
    fn name(&self) -> &str {
        "L-BFGS"
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
        self.reconcile_dimension(initial.len());

        let mut selector = self.take_selector(objective)?;
        let result = self.run_loop(objective, initial, criterion, &mut selector);
        self.selector = Some(selector);
        result
    }

    fn reset(&mut self) {
        self.selector = None;
        self.pairs.clear();
        self.previous = None;
        self.total_iterations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use stochopt_core::types::DMatrix;
    use stochopt_core::objective::QuadraticObjective;

    fn criterion(max_iterations: usize) -> StoppingCriterion<f64> {
        StoppingCriterion::new()
            .with_max_iterations(max_iterations)
            .with_gradient_tolerance(1e-10)
            .without_function_tolerance()
    }

    fn anisotropic_quadratic() -> QuadraticObjective<f64> {
        let mut a = DMatrix::zeros(3, 3);
        a[(0, 0)] = 100.0;
        a[(1, 1)] = 10.0;
        a[(2, 2)] = 1.0;
        QuadraticObjective::new(a, DVector::from_vec(vec![-100.0, 10.0, -1.0]), 0.0)
    }

    #[test]
    fn test_lbfgs_creation() {
        let solver = Lbfgs::new(LbfgsConfig::<f64>::new().with_memory_size(5));
        assert_eq!(solver.name(), "L-BFGS");
        assert!(solver.correction_pairs().is_empty());
    }

    #[test]
    fn test_zero_memory_rejected() {
        assert!(LbfgsConfig::<f64>::new()
            .with_memory_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_converges_on_ill_conditioned_quadratic() {
        let objective = anisotropic_quadratic();
        let initial = DVector::zeros(3);
        let mut solver = Lbfgs::new(
            LbfgsConfig::new()
                .with_memory_size(10)
                .with_constant_learning_rate(0.01),
        );

        let result = solver
            .minimize(&objective, &initial, &criterion(5000))
            .unwrap();
        let expected = objective.minimizer().unwrap();
        assert!(result.converged);
        assert_relative_eq!(result.argument, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_pair_count_never_exceeds_memory() {
        let objective = anisotropic_quadratic();
        let initial = DVector::zeros(3);
        let memory_size = 3;
        let mut solver = Lbfgs::new(
            LbfgsConfig::new()
                .with_memory_size(memory_size)
                .with_constant_learning_rate(0.005),
        );

        let mut current = initial;
        for _ in 0..40 {
            let result = solver
                .minimize(&objective, &current, &criterion(1))
                .unwrap();
            current = result.argument;
            assert!(solver.correction_pairs().len() <= memory_size);
        }
        // A long enough run fills the window completely.
        assert_eq!(solver.correction_pairs().len(), memory_size);
    }

    #[test]
    fn test_pairs_have_positive_curvature() {
        let objective = anisotropic_quadratic();
        let initial = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let mut solver = Lbfgs::new(
            LbfgsConfig::new()
                .with_memory_size(10)
                .with_constant_learning_rate(0.005),
        );

        let _ = solver
            .minimize(&objective, &initial, &criterion(50))
            .unwrap();
        for pair in solver.correction_pairs() {
            assert!(pair.y.dot(&pair.s) > 0.0);
            assert!(pair.rho > 0.0);
        }
    }

    #[test]
    fn test_first_step_is_steepest_descent() {
        let objective = QuadraticObjective::<f64>::isotropic(2);
        let initial = DVector::from_vec(vec![1.0, 0.0]);
        let mut solver = Lbfgs::new(
            LbfgsConfig::new()
                .with_memory_size(5)
                .with_constant_learning_rate(0.25),
        );

        // No pair stored yet, so the step is -rate * gradient.
        let result = solver
            .minimize(&objective, &initial, &criterion(1))
            .unwrap();
        assert_relative_eq!(result.argument[0], 0.75, epsilon = 1e-14);
        assert_relative_eq!(result.argument[1], 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_split_run_matches_single_run() {
        let objective = anisotropic_quadratic();
        let initial = DVector::zeros(3);
        let config = LbfgsConfig::new()
            .with_memory_size(5)
            .with_constant_learning_rate(0.005);

        let mut whole = Lbfgs::new(config.clone());
        let single = whole
            .minimize(&objective, &initial, &criterion(30))
            .unwrap();

        let mut split = Lbfgs::new(config);
        let first = split
            .minimize(&objective, &initial, &criterion(15))
            .unwrap();
        let second = split
            .minimize(&objective, &first.argument, &criterion(15))
            .unwrap();

        assert_relative_eq!(single.argument, second.argument, epsilon = 1e-10);
    }

    #[test]
    fn test_dimension_change_clears_history() {
        let mut solver = Lbfgs::new(
            LbfgsConfig::new()
                .with_memory_size(5)
                .with_constant_learning_rate(0.1),
        );

        let three = QuadraticObjective::<f64>::isotropic(3);
        let _ = solver
            .minimize(&three, &DVector::from_vec(vec![1.0, 1.0, 1.0]), &criterion(10))
            .unwrap();
        assert!(!solver.correction_pairs().is_empty());

        let two = QuadraticObjective::<f64>::isotropic(2);
        let result = solver
            .minimize(&two, &DVector::from_vec(vec![1.0, 1.0]), &criterion(10))
            .unwrap();
        assert_eq!(result.argument.len(), 2);
    }
}
