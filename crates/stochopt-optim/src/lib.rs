//! Batch and stochastic optimization algorithms.
//!
//! This crate provides concrete iterative solvers built on the
//! `stochopt-core` framework, covering first-order, adaptive, quasi-Newton,
//! and variance-reduced methods.
//!
//! # Available Solvers
//!
//! - **SGD**: mini-batch gradient descent with momentum and conservative
//!   inner iterations
//! - **Adagrad**: per-coordinate adaptive learning rates with a
//!   squared-gradient accumulator
//! - **L-BFGS**: limited-memory quasi-Newton with bounded correction-pair
//!   history
//! - **SAGA**: variance reduction through per-observation gradient memory
//!
//! # Examples
//!
//! ```rust
//! use stochopt_optim::{Sgd, SgdConfig};
//! use stochopt_core::solver::StoppingCriterion;
//!
//! // Create an SGD solver with momentum
//! let mut solver = Sgd::new(
//!     SgdConfig::new()
//!         .with_constant_learning_rate(0.01)
//!         .with_classical_momentum(0.9),
//! );
//!
//! // Set up stopping conditions
//! let criterion = StoppingCriterion::<f64>::new()
//!     .with_max_iterations(1000)
//!     .with_gradient_tolerance(1e-6);
//!
//! // Run optimization (objective and initial point defined elsewhere)
//! // let result = solver.minimize(&objective, &initial, &criterion)?;
//! ```

pub mod adagrad;
pub mod lbfgs;
pub mod saga;
pub mod sgd;

// Re-export main solvers for convenience
pub use adagrad::{Adagrad, AdagradConfig};
pub use lbfgs::{CorrectionPair, Lbfgs, LbfgsConfig};
pub use saga::{Saga, SagaConfig};
pub use sgd::{MomentumMethod, Sgd, SgdConfig};

// Re-export commonly used items from core
pub use stochopt_core::{
    batch::BatchOrder,
    schedule::LearningRateSchedule,
    solver::{IterativeSolver, OptimizationResult, StoppingCriterion, TerminationReason},
};
