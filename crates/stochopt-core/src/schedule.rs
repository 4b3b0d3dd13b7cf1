//! Learning-rate scheduling strategies for the iterative solvers.
//!
//! A schedule maps the iteration index `k` to the step size `αₖ`. The
//! per-iteration table variant covers callers that supply an explicit
//! rate sequence; the decaying variants implement the standard
//! diminishing-step formulas.

use crate::types::Scalar;
use num_traits::Float;

/// Learning-rate schedule `k ↦ αₖ`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LearningRateSchedule<T: Scalar> {
    /// Fixed step size `αₖ = α₀` for all iterations.
    Constant(T),

    /// Explicit per-iteration rates. Iterations beyond the table length
    /// reuse the last entry; a length-1 table behaves like `Constant`.
    /// An empty table yields zero and fails [`is_positive`](Self::is_positive).
    Table(Vec<T>),

    /// Exponential decay `αₖ = α₀·γᵏ` with `0 < γ < 1`.
    ExponentialDecay {
        /// Initial step size α₀
        initial: T,
        /// Decay factor γ ∈ (0, 1)
        decay_rate: T,
    },

    /// Polynomial decay `αₖ = α₀/(1 + βk)ᵖ` with `β > 0`, `p > 0`.
    PolynomialDecay {
        /// Initial step size α₀
        initial: T,
        /// Decay coefficient β > 0
        decay_rate: T,
        /// Decay power p > 0, typically 0.5-1.0
        power: T,
    },

    /// Square-root decay `αₖ = α₀/√(1 + k)`, the standard choice for
    /// stochastic methods.
    SquareRootDecay {
        /// Initial step size α₀
        initial: T,
    },
}

impl<T: Scalar> LearningRateSchedule<T> {
    /// Computes the step size `αₖ` for iteration `k`.
    pub fn rate_at(&self, iteration: usize) -> T {
        let k = <T as Scalar>::from_usize(iteration);
        match self {
            Self::Constant(alpha) => *alpha,
            Self::Table(rates) => match rates.last() {
                Some(last) => *rates.get(iteration).unwrap_or(last),
                None => T::zero(),
            },
            Self::ExponentialDecay {
                initial,
                decay_rate,
            } => *initial * <T as Float>::powf(*decay_rate, k),
            Self::PolynomialDecay {
                initial,
                decay_rate,
                power,
            } => *initial / <T as Float>::powf(T::one() + *decay_rate * k, *power),
            Self::SquareRootDecay { initial } => *initial / <T as Float>::sqrt(T::one() + k),
        }
    }

    /// True when every rate the schedule can produce is positive.
    pub fn is_positive(&self) -> bool {
        match self {
            Self::Constant(alpha) => *alpha > T::zero(),
            Self::Table(rates) => !rates.is_empty() && rates.iter().all(|r| *r > T::zero()),
            Self::ExponentialDecay {
                initial,
                decay_rate,
            } => *initial > T::zero() && *decay_rate > T::zero(),
            Self::PolynomialDecay {
                initial,
                decay_rate,
                power,
            } => *initial > T::zero() && *decay_rate > T::zero() && *power > T::zero(),
            Self::SquareRootDecay { initial } => *initial > T::zero(),
        }
    }

    /// Creates a constant schedule.
    pub fn constant(step_size: T) -> Self {
        Self::Constant(step_size)
    }

    /// Creates a per-iteration table schedule.
    pub fn table(rates: Vec<T>) -> Self {
        Self::Table(rates)
    }

    /// Creates an exponential-decay schedule.
    pub fn exponential_decay(initial: T, decay_rate: T) -> Self {
        Self::ExponentialDecay {
            initial,
            decay_rate,
        }
    }

    /// Creates a polynomial-decay schedule.
    pub fn polynomial_decay(initial: T, decay_rate: T, power: T) -> Self {
        Self::PolynomialDecay {
            initial,
            decay_rate,
            power,
        }
    }

    /// Creates a square-root-decay schedule.
    pub fn sqrt_decay(initial: T) -> Self {
        Self::SquareRootDecay { initial }
    }
}
