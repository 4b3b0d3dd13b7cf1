//! Core traits and types for stochastic gradient-based optimization.
//!
//! This crate provides the foundational traits and types for implementing
//! iterative solvers over dataset-backed objective functions. It defines
//! the objective-function interface, the solver state machine, batch
//! selection, and learning-rate scheduling that the concrete algorithms
//! build on.
//!
//! # Key Concepts
//!
//! - **Objective Functions**: Scalar losses over a parameter vector,
//!   evaluated on mini-batches of observations
//! - **Solver State Machine**: Configured, running, and terminal states
//!   with explicit termination reasons
//! - **Batch Selection**: Deterministic sequential or seeded-shuffle
//!   index streams owned by the solver
//! - **Schedules**: Per-iteration learning-rate policies
//!
//! # Modules
//!
//! - [`batch`]: Mini-batch index selection
//! - [`dataset`]: Observation matrix and response vector container
//! - [`error`]: Error types for evaluation and solver runs
//! - [`objective`]: Objective-function interface and concrete losses
//! - [`schedule`]: Learning-rate schedules
//! - [`solver`]: Solver trait, state, and convergence control
//! - [`types`]: Type aliases and numerical constants

pub mod batch;
pub mod dataset;
pub mod error;
pub mod objective;
pub mod schedule;
pub mod solver;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{ObjectiveError, Result, SolverError, SolverResult};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use stochopt_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{BatchOrder, BatchSelector};
    pub use crate::dataset::Dataset;
    pub use crate::error::{ObjectiveError, Result, SolverError, SolverResult};
    pub use crate::objective::{
        CountingObjective, Evaluation, EvaluationRequest, LogisticObjective, MseObjective,
        ObjectiveFunction, QuadraticObjective,
    };
    pub use crate::schedule::LearningRateSchedule;
    pub use crate::solver::{
        ConvergenceChecker, IterativeSolver, OptimizationResult, SolverState, StoppingCriterion,
        TerminationReason,
    };
    pub use crate::types::{constants, DMatrix, DVector, Scalar};
}
