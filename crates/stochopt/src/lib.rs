//! Batch and stochastic optimization for dataset-backed objectives.
//!
//! This is the facade crate: it re-exports the objective-function
//! framework from `stochopt-core` and the concrete solvers from
//! `stochopt-optim` under one roof.
//!
//! # Quick Start
//!
//! ```rust
//! use stochopt::prelude::*;
//!
//! // Least-squares regression: y = 1 + 2x, fit by full-batch SGD.
//! let features = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
//! let responses = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0]);
//! let objective = MseObjective::new(Dataset::new(features, responses).unwrap());
//!
//! let mut solver = Sgd::new(SgdConfig::new().with_constant_learning_rate(0.05));
//! let criterion = StoppingCriterion::new()
//!     .with_max_iterations(5000)
//!     .with_gradient_tolerance(1e-8);
//!
//! let result = solver
//!     .minimize(&objective, &DVector::zeros(2), &criterion)
//!     .unwrap();
//! assert!(result.converged);
//! ```

pub use stochopt_core as core;
pub use stochopt_optim as optim;

// Re-export nalgebra so downstream crates share one linear-algebra stack.
pub use nalgebra;

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use stochopt::prelude::*;
/// ```
pub mod prelude {
    pub use stochopt_core::prelude::*;
    pub use stochopt_optim::{
        Adagrad, AdagradConfig, CorrectionPair, Lbfgs, LbfgsConfig, MomentumMethod, Saga,
        SagaConfig, Sgd, SgdConfig,
    };
}
