//! Type definitions and aliases for the optimization core.
//!
//! This module provides the scalar abstraction shared by every solver,
//! type aliases for the nalgebra containers the library works with, and
//! numerical constants used by convergence checks.

use nalgebra::{Dyn, OMatrix, OVector, RealField, Scalar as NalgebraScalar};
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display};

/// Trait for scalar types used in optimization (f32 or f64).
///
/// This trait combines all the necessary numeric traits required by the
/// solver and objective-function implementations.
pub trait Scalar:
    NalgebraScalar
    + RealField
    + Float
    + FromPrimitive
    + Display
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Machine epsilon for this scalar type.
    const EPSILON: Self;

    /// Default tolerance for gradient-norm convergence checks.
    const DEFAULT_GRADIENT_TOLERANCE: Self;

    /// Default tolerance for successive-objective-value convergence checks.
    const DEFAULT_FUNCTION_TOLERANCE: Self;

    /// Stabilizing constant for per-coordinate adaptive denominators.
    const ADAPTIVE_EPSILON: Self;

    /// Curvature threshold below which quasi-Newton pair updates are skipped.
    const CURVATURE_THRESHOLD: Self;

    /// Convert from f64 (for constants).
    ///
    /// # Panics
    ///
    /// Panics if the conversion fails. Use `try_from_f64` for a
    /// non-panicking version.
    fn from_f64(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).expect("Failed to convert from f64")
    }

    /// Try to convert from f64.
    fn try_from_f64(v: f64) -> Option<Self> {
        <Self as FromPrimitive>::from_f64(v)
    }

    /// Convert to f64 (for diagnostics and display).
    ///
    /// # Panics
    ///
    /// Panics if the conversion fails. Use `try_to_f64` for a
    /// non-panicking version.
    fn to_f64(self) -> f64 {
        num_traits::cast(self).expect("Failed to convert to f64")
    }

    /// Try to convert to f64.
    fn try_to_f64(self) -> Option<f64> {
        num_traits::cast(self)
    }

    /// Convert from usize (for iteration counts).
    ///
    /// # Panics
    ///
    /// Panics if the conversion fails. Use `try_from_usize` for a
    /// non-panicking version.
    fn from_usize(v: usize) -> Self {
        <Self as FromPrimitive>::from_usize(v).expect("Failed to convert from usize")
    }

    /// Try to convert from usize.
    fn try_from_usize(v: usize) -> Option<Self> {
        <Self as FromPrimitive>::from_usize(v)
    }
}

impl Scalar for f32 {
    const EPSILON: Self = f32::EPSILON;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-5;
    const DEFAULT_FUNCTION_TOLERANCE: Self = 1e-7;
    const ADAPTIVE_EPSILON: Self = 1e-6;
    const CURVATURE_THRESHOLD: Self = 1e-6;
}

impl Scalar for f64 {
    const EPSILON: Self = f64::EPSILON;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-8;
    const DEFAULT_FUNCTION_TOLERANCE: Self = 1e-12;
    const ADAPTIVE_EPSILON: Self = 1e-8;
    const CURVATURE_THRESHOLD: Self = 1e-10;
}

/// Type alias for a dynamically-sized parameter or gradient vector.
pub type DVector<T> = OVector<T, Dyn>;

/// Type alias for a dynamically-sized matrix (feature buffers, Hessians).
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Numerical constants for different precision levels.
pub mod constants {
    use super::Scalar;

    /// Get machine epsilon for the given scalar type.
    pub fn epsilon<T: Scalar>() -> T {
        T::EPSILON
    }

    /// Get the default gradient convergence tolerance.
    pub fn gradient_tolerance<T: Scalar>() -> T {
        T::DEFAULT_GRADIENT_TOLERANCE
    }

    /// Get the default successive-value convergence tolerance.
    pub fn function_tolerance<T: Scalar>() -> T {
        T::DEFAULT_FUNCTION_TOLERANCE
    }

    /// Get the stabilizing epsilon used by adaptive per-coordinate rules.
    pub fn adaptive_epsilon<T: Scalar>() -> T {
        T::ADAPTIVE_EPSILON
    }
}
