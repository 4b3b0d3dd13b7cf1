//! Convergence and termination tests across the solver family.
//!
//! These tests verify the properties the solver framework guarantees:
//! descent on convex problems, exact iteration accounting, preservation
//! of partial progress on numerical failure, and continuation semantics
//! across split runs.

use approx::assert_relative_eq;
use stochopt_core::{
    batch::BatchOrder,
    dataset::Dataset,
    error::{ObjectiveError, Result, SolverError},
    objective::{MseObjective, ObjectiveFunction, QuadraticObjective},
    solver::{IterativeSolver, StoppingCriterion, TerminationReason},
    types::{DMatrix, DVector},
};
use stochopt_optim::{
    Adagrad, AdagradConfig, Lbfgs, LbfgsConfig, Saga, SagaConfig, Sgd, SgdConfig,
};

fn criterion(max_iterations: usize) -> StoppingCriterion<f64> {
    StoppingCriterion::new()
        .with_max_iterations(max_iterations)
        .with_gradient_tolerance(1e-8)
        .without_function_tolerance()
}

/// Noise-free synthetic regression with 4 features and 40 observations.
///
/// Responses follow the linear model exactly, so the least-squares
/// solution equals the generating coefficients.
fn synthetic_regression() -> (MseObjective<f64>, DVector<f64>) {
    let n = 40;
    let p = 4;
    let truth = DVector::from_vec(vec![0.5, 1.5, -2.0, 0.75, 0.25]);

    let mut features = DMatrix::zeros(n, p);
    for i in 0..n {
        for j in 0..p {
            // Deterministic, roughly centered feature values.
            let raw = ((i * 31 + j * 17 + 5) % 13) as f64;
            features[(i, j)] = (raw - 6.0) / 3.0;
        }
    }
    let mut responses = DVector::zeros(n);
    for i in 0..n {
        let mut y = truth[0];
        for j in 0..p {
            y += truth[j + 1] * features[(i, j)];
        }
        responses[i] = y;
    }

    let objective = MseObjective::new(Dataset::new(features, responses).unwrap());
    (objective, truth)
}

#[test]
fn test_full_batch_sgd_descends_monotonically() {
    let objective = QuadraticObjective::<f64>::isotropic(4);
    let mut current = DVector::from_vec(vec![1.0, -2.0, 3.0, -4.0]);
    let mut solver = Sgd::new(SgdConfig::new().with_constant_learning_rate(0.1));

    let mut previous_value = objective.value(&current, &[0]).unwrap();
    for _ in 0..50 {
        let result = solver
            .minimize(&objective, &current, &criterion(1))
            .unwrap();
        current = result.argument;
        let value = objective.value(&current, &[0]).unwrap();
        assert!(value <= previous_value);
        previous_value = value;
    }
}

#[test]
fn test_zero_iteration_cap_returns_start_for_every_solver() {
    let objective = QuadraticObjective::<f64>::isotropic(3);
    let initial = DVector::from_vec(vec![1.0, 2.0, 3.0]);
    let cap = criterion(0);

    let mut sgd = Sgd::new(SgdConfig::new());
    let result = sgd.minimize(&objective, &initial, &cap).unwrap();
    assert_eq!(result.iterations, 0);
    assert_relative_eq!(result.argument, initial);

    let mut adagrad = Adagrad::new(AdagradConfig::new());
    let result = adagrad.minimize(&objective, &initial, &cap).unwrap();
    assert_eq!(result.iterations, 0);
    assert_relative_eq!(result.argument, initial);

    let mut lbfgs = Lbfgs::new(LbfgsConfig::new());
    let result = lbfgs.minimize(&objective, &initial, &cap).unwrap();
    assert_eq!(result.iterations, 0);
    assert_relative_eq!(result.argument, initial);

    let mut saga = Saga::new(SagaConfig::new());
    let result = saga.minimize(&objective, &initial, &cap).unwrap();
    assert_eq!(result.iterations, 0);
    assert_relative_eq!(result.argument, initial);
}

#[test]
fn test_zero_gradient_at_start_converges_immediately() {
    // The isotropic quadratic has its minimizer at the origin.
    let objective = QuadraticObjective::<f64>::isotropic(3);
    let minimizer = DVector::zeros(3);
    let tight = criterion(100);

    let mut sgd = Sgd::new(SgdConfig::new());
    let result = sgd.minimize(&objective, &minimizer, &tight).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Converged);
    assert_eq!(result.iterations, 0);

    let mut adagrad = Adagrad::new(AdagradConfig::new());
    let result = adagrad.minimize(&objective, &minimizer, &tight).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Converged);
    assert_eq!(result.iterations, 0);

    let mut lbfgs = Lbfgs::new(LbfgsConfig::new());
    let result = lbfgs.minimize(&objective, &minimizer, &tight).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Converged);
    assert_eq!(result.iterations, 0);

    let mut saga = Saga::new(SagaConfig::new());
    let result = saga.minimize(&objective, &minimizer, &tight).unwrap();
    assert_eq!(result.termination_reason, TerminationReason::Converged);
    assert_eq!(result.iterations, 0);
}

/// Objective that turns non-finite after a fixed number of evaluations.
#[derive(Debug)]
struct PoisonedObjective {
    healthy_evaluations: std::cell::Cell<usize>,
}

impl PoisonedObjective {
    fn new(healthy_evaluations: usize) -> Self {
        Self {
            healthy_evaluations: std::cell::Cell::new(healthy_evaluations),
        }
    }
}

impl ObjectiveFunction<f64> for PoisonedObjective {
    fn dimension(&self) -> usize {
        2
    }

    fn num_observations(&self) -> usize {
        1
    }

    fn value(&self, argument: &DVector<f64>, _indices: &[usize]) -> Result<f64> {
        Ok(argument.norm_squared())
    }

    fn value_and_gradient(
        &self,
        argument: &DVector<f64>,
        _indices: &[usize],
    ) -> Result<(f64, DVector<f64>)> {
        let remaining = self.healthy_evaluations.get();
        if remaining == 0 {
            return Ok((f64::NAN, argument * 2.0));
        }
        self.healthy_evaluations.set(remaining - 1);
        Ok((argument.norm_squared(), argument * 2.0))
    }
}

#[test]
fn test_numerical_failure_preserves_partial_progress() {
    let objective = PoisonedObjective::new(3);
    let initial = DVector::from_vec(vec![4.0, 4.0]);
    let mut solver = Sgd::new(SgdConfig::new().with_constant_learning_rate(0.25));

    let result = solver
        .minimize(&objective, &initial, &criterion(100))
        .unwrap();
    assert_eq!(
        result.termination_reason,
        TerminationReason::NumericalFailure { iteration: 3 }
    );
    assert_eq!(result.iterations, 3);
    // Three healthy steps at rate 0.25 halve the argument each time.
    assert!(result.argument.iter().all(|x| x.is_finite()));
    assert_relative_eq!(result.argument[0], 0.5, epsilon = 1e-12);
}

#[test]
fn test_configuration_errors_reported_before_running() {
    let (objective, _) = synthetic_regression();
    let initial = DVector::zeros(5);

    // Batch size larger than the number of observations.
    let mut solver = Sgd::new(
        SgdConfig::new()
            .with_constant_learning_rate(0.01)
            .with_batch_size(1000),
    );
    let err = solver
        .minimize(&objective, &initial, &criterion(10))
        .unwrap_err();
    assert!(matches!(err, SolverError::InvalidConfiguration { .. }));
    assert_eq!(solver.total_iterations(), 0);

    // Negative tolerance.
    let mut solver = Sgd::new(SgdConfig::new());
    let bad = StoppingCriterion::new().with_gradient_tolerance(-1.0);
    let err = solver.minimize(&objective, &initial, &bad).unwrap_err();
    assert!(matches!(err, SolverError::InvalidConfiguration { .. }));

    // L-BFGS with no correction-pair memory.
    let mut solver = Lbfgs::new(LbfgsConfig::<f64>::new().with_memory_size(0));
    let err = solver
        .minimize(&objective, &initial, &criterion(10))
        .unwrap_err();
    assert!(matches!(err, SolverError::InvalidConfiguration { .. }));
}

#[test]
fn test_dimension_mismatch_detected_before_state_mutation() {
    let features = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
    let responses = DVector::from_vec(vec![1.0, 2.0, 3.0]);
    let objective = MseObjective::new(Dataset::new(features, responses).unwrap());

    // Parameter dimension is num_features + 1 = 2, not 4.
    let wrong = DVector::zeros(4);
    let mut solver = Adagrad::new(AdagradConfig::new());
    let err = solver
        .minimize(&objective, &wrong, &criterion(10))
        .unwrap_err();
    assert!(matches!(
        err,
        SolverError::Objective(ObjectiveError::InvalidDimension { .. })
    ));
    assert!(solver.accumulator().is_none());
}

#[test]
fn test_mini_batch_split_run_matches_single_run() {
    let (objective, _) = synthetic_regression();
    let initial = DVector::zeros(5);
    let config = SgdConfig::new()
        .with_constant_learning_rate(0.02)
        .with_batch_size(8)
        .with_batch_order(BatchOrder::Shuffled { seed: 42 });

    let mut whole = Sgd::new(config.clone());
    let single = whole
        .minimize(&objective, &initial, &criterion(60))
        .unwrap();

    let mut split = Sgd::new(config);
    let first = split
        .minimize(&objective, &initial, &criterion(30))
        .unwrap();
    let second = split
        .minimize(&objective, &first.argument, &criterion(30))
        .unwrap();

    assert_eq!(single.iterations, 60);
    assert_eq!(first.iterations + second.iterations, 60);
    assert_relative_eq!(single.argument, second.argument, epsilon = 1e-12);
}

#[test]
fn test_adagrad_split_run_matches_single_run() {
    // The squared-gradient accumulator must carry over, not just the
    // batch cursor.
    let (objective, _) = synthetic_regression();
    let initial = DVector::zeros(5);
    let config = AdagradConfig::new()
        .with_constant_learning_rate(0.1)
        .with_batch_size(8)
        .with_batch_order(BatchOrder::Shuffled { seed: 42 });

    let mut whole = Adagrad::new(config.clone());
    let single = whole
        .minimize(&objective, &initial, &criterion(60))
        .unwrap();

    let mut split = Adagrad::new(config);
    let first = split
        .minimize(&objective, &initial, &criterion(30))
        .unwrap();
    let second = split
        .minimize(&objective, &first.argument, &criterion(30))
        .unwrap();

    assert_eq!(first.iterations + second.iterations, 60);
    assert_relative_eq!(single.argument, second.argument, epsilon = 1e-12);
}

#[test]
fn test_saga_split_run_matches_single_run() {
    // The stored-gradient table and its running sum must carry over.
    let (objective, _) = synthetic_regression();
    let initial = DVector::zeros(5);
    let config = SagaConfig::new()
        .with_constant_learning_rate(0.005)
        .with_batch_size(4)
        .with_batch_order(BatchOrder::Shuffled { seed: 11 });

    let mut whole = Saga::new(config.clone());
    let single = whole
        .minimize(&objective, &initial, &criterion(60))
        .unwrap();

    let mut split = Saga::new(config);
    let first = split
        .minimize(&objective, &initial, &criterion(30))
        .unwrap();
    let second = split
        .minimize(&objective, &first.argument, &criterion(30))
        .unwrap();

    assert_eq!(first.iterations + second.iterations, 60);
    assert_relative_eq!(single.argument, second.argument, epsilon = 1e-12);
}

#[test]
fn test_full_batch_sgd_recovers_least_squares_solution() {
    let (objective, truth) = synthetic_regression();
    let initial = DVector::zeros(5);
    let mut solver = Sgd::new(SgdConfig::new().with_constant_learning_rate(0.05));

    let result = solver
        .minimize(&objective, &initial, &criterion(20_000))
        .unwrap();
    assert_relative_eq!(result.argument, truth, epsilon = 1e-4);
}

#[test]
fn test_online_sgd_recovers_least_squares_solution() {
    // batch_size = 1 degenerates SGD to online gradient descent; the
    // noise-free responses make the least-squares solution a common
    // zero of every per-observation gradient, so it is reachable.
    let (objective, truth) = synthetic_regression();
    let initial = DVector::from_vec(vec![8.0, 2.0, 1.0, 4.0, 1.0]);
    let mut solver = Sgd::new(
        SgdConfig::new()
            .with_constant_learning_rate(0.02)
            .with_batch_size(1),
    );

    let result = solver
        .minimize(&objective, &initial, &criterion(20_000))
        .unwrap();
    assert!(result.iterations <= 20_000);
    assert_relative_eq!(result.argument, truth, epsilon = 1e-3);
}

#[test]
fn test_lbfgs_recovers_least_squares_solution() {
    let (objective, truth) = synthetic_regression();
    let initial = DVector::zeros(5);
    let mut solver = Lbfgs::new(
        LbfgsConfig::new()
            .with_memory_size(10)
            .with_constant_learning_rate(0.05),
    );

    let tight = StoppingCriterion::new()
        .with_max_iterations(10_000)
        .with_gradient_tolerance(1e-10)
        .without_function_tolerance();
    let result = solver.minimize(&objective, &initial, &tight).unwrap();

    assert!(result.converged);
    assert_relative_eq!(result.argument, truth, epsilon = 1e-5);
    assert_relative_eq!(result.value, 0.0, epsilon = 1e-10);
}

#[test]
fn test_mini_batch_sgd_reduces_loss() {
    let (objective, _) = synthetic_regression();
    let initial = DVector::zeros(5);
    let all: Vec<usize> = (0..objective.num_observations()).collect();
    let initial_loss = objective.value(&initial, &all).unwrap();

    let mut solver = Sgd::new(
        SgdConfig::new()
            .with_constant_learning_rate(0.02)
            .with_batch_size(10)
            .with_batch_order(BatchOrder::Shuffled { seed: 7 }),
    );
    let result = solver
        .minimize(&objective, &initial, &criterion(400))
        .unwrap();

    let final_loss = objective.value(&result.argument, &all).unwrap();
    assert!(final_loss < initial_loss * 0.1);
}

#[test]
fn test_adagrad_recovers_least_squares_solution() {
    let (objective, truth) = synthetic_regression();
    let initial = DVector::zeros(5);
    let mut solver = Adagrad::new(AdagradConfig::new().with_constant_learning_rate(0.5));

    let tight = StoppingCriterion::new()
        .with_max_iterations(50_000)
        .with_gradient_tolerance(1e-8)
        .without_function_tolerance();
    let result = solver.minimize(&objective, &initial, &tight).unwrap();
    assert_relative_eq!(result.argument, truth, epsilon = 1e-3);
}

#[test]
fn test_tight_tolerance_converges_before_cap() {
    let objective = QuadraticObjective::<f64>::isotropic(3);
    let initial = DVector::from_vec(vec![1.0, 1.0, 1.0]);
    let mut solver = Sgd::new(SgdConfig::new().with_constant_learning_rate(0.5));

    let result = solver
        .minimize(&objective, &initial, &criterion(10_000))
        .unwrap();
    assert!(result.converged);
    assert!(result.iterations < 10_000);
}

#[cfg(feature = "serde")]
#[test]
fn test_configurations_and_results_are_serializable() {
    fn assert_round_trippable<S: serde::Serialize + serde::de::DeserializeOwned>() {}
    assert_round_trippable::<SgdConfig<f64>>();
    assert_round_trippable::<AdagradConfig<f64>>();
    assert_round_trippable::<LbfgsConfig<f64>>();
    assert_round_trippable::<SagaConfig<f64>>();
    assert_round_trippable::<stochopt_core::solver::OptimizationResult<f64>>();
    assert_round_trippable::<StoppingCriterion<f64>>();
}

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_adagrad_accumulator_never_decreases(
            x0 in -10.0f64..10.0,
            x1 in -10.0f64..10.0,
            steps in 1usize..20,
        ) {
            let objective = QuadraticObjective::<f64>::isotropic(2);
            let mut current = DVector::from_vec(vec![x0, x1]);
            let mut solver =
                Adagrad::new(AdagradConfig::new().with_constant_learning_rate(0.1));

            let mut previous = DVector::zeros(2);
            for _ in 0..steps {
                let result = solver
                    .minimize(&objective, &current, &criterion(1))
                    .unwrap();
                current = result.argument;
                let accumulator = solver.accumulator().unwrap();
                for i in 0..2 {
                    prop_assert!(accumulator[i] >= previous[i]);
                }
                previous = accumulator.clone();
            }
        }

        #[test]
        fn prop_lbfgs_pair_count_bounded_by_memory(
            memory_size in 1usize..8,
            iterations in 1usize..60,
        ) {
            let objective = QuadraticObjective::<f64>::isotropic(3);
            let initial = DVector::from_vec(vec![5.0, -3.0, 2.0]);
            let mut solver = Lbfgs::new(
                LbfgsConfig::new()
                    .with_memory_size(memory_size)
                    .with_constant_learning_rate(0.1),
            );

            let _ = solver
                .minimize(&objective, &initial, &criterion(iterations))
                .unwrap();
            prop_assert!(solver.correction_pairs().len() <= memory_size);
        }
    }
}
