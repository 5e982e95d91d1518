//! # MNA Core
//!
//! A Modified Nodal Analysis (MNA) engine for discrete-time circuit
//! simulation.
//!
//! This library provides:
//! - A topology builder that discovers nodes from element terminal positions
//!   and sizes the MNA system
//! - A row simplifier that collapses constant and equal unknowns before
//!   factorization
//! - A dense LU kernel (Crout's method with partial pivoting)
//! - Graph-based integrity checks for pathological topologies (voltage-source
//!   loops, shorted capacitors, dangling inductors)
//! - A per-timestep iteration engine with convergence detection for
//!   nonlinear circuits
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`elements`] - The [`Element`](elements::Element) contract and the
//!   built-in element set (R, C, L, sources, wires, diodes)
//! - [`circuit`] - Node arena types and the path-integrity search
//! - [`solver`] - MNA matrix assembly, row simplification, LU factorization,
//!   and the [`Simulator`] driver
//!
//! ## Usage
//!
//! ```no_run
//! use mna_core::elements::{Element, Resistor, VoltageSource};
//! use mna_core::{Point, Simulator};
//!
//! let elements: Vec<Box<dyn Element>> = vec![
//!     Box::new(VoltageSource::dc(Point::new(0, 0), Point::new(0, 1), 10.0)),
//!     Box::new(Resistor::new(Point::new(0, 1), Point::new(1, 1), 1000.0)),
//!     Box::new(Resistor::new(Point::new(1, 1), Point::new(0, 0), 1000.0)),
//! ];
//!
//! let mut sim = Simulator::new(1e-5);
//! sim.rebuild_topology(elements).unwrap();
//! sim.step_time().unwrap();
//! ```
//!
//! ## Simulation Method
//!
//! For each time step the engine:
//!
//! 1. Lets every element update its companion-model state
//!    (`start_iteration`)
//! 2. Restores the right side (and, for nonlinear circuits, the matrix) from
//!    the post-simplification snapshot and lets elements re-stamp
//!    step-dependent terms (`do_step`)
//! 3. Solves the reduced system, re-factoring per sub-iteration when the
//!    circuit is nonlinear, until the solution converges
//! 4. Distributes node voltages and branch currents back to the elements
//!
//! Reactive elements use trapezoidal companion models, so a linear circuit
//! factors its matrix exactly once per topology change and solves with a
//! single back-substitution per step.

pub mod circuit;
pub mod elements;
pub mod error;
pub mod solver;

// Re-export main types for convenience
pub use circuit::Point;
pub use elements::Element;
pub use error::{Result, SimError};
pub use solver::{Simulator, SimulatorConfig, StepObserver, StopState};

/// Default simulation timestep in seconds.
pub const DEFAULT_TIME_STEP: f64 = 5e-6;
