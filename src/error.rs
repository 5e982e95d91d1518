//! Error types for the MNA simulation engine.
//!
//! This module provides a unified error type [`SimError`] that covers all
//! fatal conditions raised during topology analysis and time stepping.
//!
//! Fatal conditions are also persisted on the simulator as a
//! [`StopState`](crate::solver::StopState) record; once stopped, every
//! subsequent stepping call returns the stored error until the topology is
//! rebuilt. Elements themselves never return errors across the stamping
//! boundary - a stamp primitive handed an unusable value records a fault on
//! the system context, which the engine checks and escalates centrally.

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Unified error type for all simulation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    // ============ Configuration Errors ============
    /// A stamp primitive was handed an unusable value (for example a zero or
    /// non-finite resistance). Aborts the current build; not recoverable
    /// without the caller fixing the element.
    #[error("bad configuration: {message}")]
    BadConfiguration { message: String },

    // ============ Topology Defects ============
    /// A loop of voltage sources and/or wires with no resistance.
    #[error("Voltage source/wire loop with no resistance!")]
    VoltageSourceLoop,

    /// A loop through capacitors, wires, and voltage sources with no
    /// resistance.
    #[error("Capacitor loop with no resistance!")]
    CapacitorLoop,

    /// A current source with no return path for its current.
    #[error("No path for current source!")]
    NoCurrentPath,

    /// A matrix row reduced to zero unknowns during simplification.
    #[error("Matrix error")]
    MatrixError,

    // ============ Numerical Failures ============
    /// Factorization found an all-zero scaled row.
    #[error("Singular matrix!")]
    SingularMatrix,

    /// A NaN or infinite entry appeared in the system matrix.
    #[error("nan/infinite matrix!")]
    NonFiniteMatrix,

    /// The sub-iteration cap was exhausted without convergence.
    #[error("Convergence failed!")]
    ConvergenceFailed { iterations: usize },
}

impl SimError {
    /// Create a configuration error.
    pub fn bad_configuration(message: impl Into<String>) -> Self {
        Self::BadConfiguration {
            message: message.into(),
        }
    }
}
