//! Circuit elements and the capability contract they implement.
//!
//! Every element is a free-standing [`Element`] implementation; there is no
//! shared mutable base state. Elements never reach into the simulator -
//! every stamping call receives the [`MnaSystem`] context explicitly.

mod diode;
mod linear;
mod sources;

pub use diode::Diode;
pub use linear::{Capacitor, Inductor, Resistor, Wire};
pub use sources::{CurrentSource, Ground, Rail, VoltageSource, Waveform};

use crate::circuit::Point;
use crate::solver::MnaSystem;

/// Element classification, used by the topology and integrity passes to
/// special-case certain elements without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Ground,
    Rail,
    Wire,
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    Diode,
    Other,
}

impl ElementKind {
    /// Whether this element constrains a node pair (or a node and ground)
    /// to a source voltage. Wires are not included; they are detected via
    /// [`Element::is_wire`].
    pub fn is_voltage_source(self) -> bool {
        matches!(
            self,
            ElementKind::VoltageSource | ElementKind::Rail | ElementKind::Ground
        )
    }
}

/// The capability contract every circuit element implements.
///
/// The engine drives elements through this trait only: topology shape is
/// queried once per rebuild, `stamp` contributes one-time linear terms,
/// and `start_iteration`/`do_step` run every timestep. Solved results come
/// back through `set_node_voltage` and `set_voltage_source_current`.
pub trait Element {
    /// Element classification for topology and integrity analysis.
    fn kind(&self) -> ElementKind {
        ElementKind::Other
    }

    /// Number of external terminals.
    fn post_count(&self) -> usize;

    /// Number of synthetic nodes private to this element.
    fn internal_node_count(&self) -> usize {
        0
    }

    /// Number of voltage-source rows this element contributes.
    fn voltage_source_count(&self) -> usize {
        0
    }

    /// Terminal location key, used for node merging during topology build.
    fn get_post(&self, post: usize) -> Point;

    /// Record the node index assigned to a terminal (or internal node, for
    /// indices at and beyond `post_count`).
    fn set_node(&mut self, post: usize, node: usize);

    /// The node index assigned to a terminal.
    fn node(&self, post: usize) -> usize;

    /// Record the global index assigned to the element's `n`-th internal
    /// voltage source.
    fn set_voltage_source(&mut self, n: usize, vs: usize) {
        let _ = (n, vs);
    }

    /// Whether this terminal is tied to ground outside the node graph.
    fn has_ground_connection(&self, post: usize) -> bool {
        let _ = post;
        false
    }

    /// Whether current can flow between two terminals of this element.
    fn get_connection(&self, a: usize, b: usize) -> bool {
        let _ = (a, b);
        true
    }

    /// Whether this element is a plain wire (zero-resistance connection).
    fn is_wire(&self) -> bool {
        false
    }

    /// Whether this element re-stamps matrix coefficients every
    /// sub-iteration.
    fn nonlinear(&self) -> bool {
        false
    }

    /// Contribute one-time linear terms to the system.
    fn stamp(&mut self, sys: &mut MnaSystem);

    /// Update companion-model source terms from the previous timestep's
    /// solved state. Called once at the start of every timestep.
    fn start_iteration(&mut self, dt: f64) {
        let _ = dt;
    }

    /// Contribute per-sub-iteration terms (right side and, for nonlinear
    /// elements, matrix entries).
    fn do_step(&mut self, sys: &mut MnaSystem) {
        let _ = sys;
    }

    /// Receive the solved voltage for a terminal.
    fn set_node_voltage(&mut self, post: usize, v: f64);

    /// Receive the solved current for the global voltage-source index `vs`.
    fn set_voltage_source_current(&mut self, vs: usize, current: f64) {
        let _ = (vs, current);
    }

    /// The solved voltage at a terminal.
    fn voltage(&self, post: usize) -> f64;

    /// The current through this element (terminal 0 to terminal 1).
    fn current(&self) -> f64 {
        0.0
    }

    /// Clear to a known small-perturbation state. Used by the integrity
    /// checker to break pathological loops without failing the whole
    /// simulation.
    fn reset(&mut self);
}
