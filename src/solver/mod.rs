//! The MNA solver pipeline.
//!
//! Modified nodal analysis builds one linear system per circuit topology:
//! one KCL row per non-ground node plus one KVL row per voltage source,
//! with node voltages and source currents as the unknowns. [`matrix`]
//! holds that system and the stamp primitives, [`rows`] eliminates
//! provably trivial rows before factorization, [`lu`] factors and solves,
//! and [`engine`] drives the whole pipeline per timestep.

mod engine;
mod lu;
mod matrix;
mod rows;

pub use engine::{Simulator, SimulatorConfig, StepObserver, StopState};
pub use lu::{lu_factor, lu_solve};
pub use matrix::{MnaSystem, RowInfo, RowKind};

/// Newton sub-iteration bound per timestep before giving up.
pub const SUB_ITERATION_LIMIT: usize = 5000;

/// Replacement value for an exactly zero pivot during factorization.
pub const PIVOT_FLOOR: f64 = 1e-18;

/// Leak resistance stamped from unconnected nodes to ground, ohms.
pub const STUB_RESISTANCE: f64 = 1e8;
