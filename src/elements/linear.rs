//! Linear passive elements: wires, resistors, capacitors, inductors.

use crate::circuit::Point;
use crate::solver::MnaSystem;

use super::{Element, ElementKind};

/// A resistor between two posts.
pub struct Resistor {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    pub resistance: f64,
    current: f64,
}

impl Resistor {
    pub fn new(p1: Point, p2: Point, resistance: f64) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            resistance,
            current: 0.0,
        }
    }
}

impl Element for Resistor {
    fn kind(&self) -> ElementKind {
        ElementKind::Resistor
    }

    fn post_count(&self) -> usize {
        2
    }

    fn get_post(&self, post: usize) -> Point {
        self.posts[post]
    }

    fn set_node(&mut self, post: usize, node: usize) {
        self.nodes[post] = node;
    }

    fn node(&self, post: usize) -> usize {
        self.nodes[post]
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        sys.stamp_resistor(self.nodes[0], self.nodes[1], self.resistance);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
        self.current = (self.volts[0] - self.volts[1]) / self.resistance;
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
        self.current = 0.0;
    }
}

/// A zero-resistance connection, stamped as a 0 V source so the row
/// simplifier collapses it to a node equality.
pub struct Wire {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    vs: usize,
    current: f64,
}

impl Wire {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            vs: 0,
            current: 0.0,
        }
    }
}

impl Element for Wire {
    fn kind(&self) -> ElementKind {
        ElementKind::Wire
    }

    fn post_count(&self) -> usize {
        2
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn get_post(&self, post: usize) -> Point {
        self.posts[post]
    }

    fn set_node(&mut self, post: usize, node: usize) {
        self.nodes[post] = node;
    }

    fn node(&self, post: usize) -> usize {
        self.nodes[post]
    }

    fn set_voltage_source(&mut self, _n: usize, vs: usize) {
        self.vs = vs;
    }

    fn is_wire(&self) -> bool {
        true
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        sys.stamp_voltage_source(self.nodes[0], self.nodes[1], self.vs, 0.0);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
    }

    fn set_voltage_source_current(&mut self, vs: usize, current: f64) {
        if vs == self.vs {
            self.current = current;
        }
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
        self.current = 0.0;
    }
}

/// A capacitor between two posts.
///
/// The companion model (Norton equivalent, trapezoidal rule) is a current
/// source in parallel with a resistor: the resistor is stamped once per
/// topology build and the history current source is re-stamped every step.
/// Trapezoidal is more accurate than backward Euler but can ring if RC is
/// small relative to the timestep.
pub struct Capacitor {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    pub capacitance: f64,
    comp_resistance: f64,
    voltdiff: f64,
    cur_source_value: f64,
    current: f64,
}

impl Capacitor {
    pub fn new(p1: Point, p2: Point, capacitance: f64) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            capacitance,
            comp_resistance: 0.0,
            voltdiff: 0.0,
            cur_source_value: 0.0,
            current: 0.0,
        }
    }

    /// Voltage across the capacitor from the last solve.
    pub fn voltage_diff(&self) -> f64 {
        self.voltdiff
    }
}

impl Element for Capacitor {
    fn kind(&self) -> ElementKind {
        ElementKind::Capacitor
    }

    fn post_count(&self) -> usize {
        2
    }

    fn get_post(&self, post: usize) -> Point {
        self.posts[post]
    }

    fn set_node(&mut self, post: usize, node: usize) {
        self.nodes[post] = node;
    }

    fn node(&self, post: usize) -> usize {
        self.nodes[post]
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        self.comp_resistance = sys.time_step() / (2.0 * self.capacitance);
        sys.stamp_resistor(self.nodes[0], self.nodes[1], self.comp_resistance);
        sys.mark_right_side_changes(self.nodes[0]);
        sys.mark_right_side_changes(self.nodes[1]);
    }

    fn start_iteration(&mut self, _dt: f64) {
        self.cur_source_value = -self.voltdiff / self.comp_resistance - self.current;
    }

    fn do_step(&mut self, sys: &mut MnaSystem) {
        sys.stamp_current_source(self.nodes[0], self.nodes[1], self.cur_source_value);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
        self.voltdiff = self.volts[0] - self.volts[1];
        // guard: this can run before stamp() sets the companion resistance
        if self.comp_resistance > 0.0 {
            self.current = self.voltdiff / self.comp_resistance + self.cur_source_value;
        }
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
        self.current = 0.0;
        self.cur_source_value = 0.0;
        // put a small charge on reset capacitors to start oscillators
        self.voltdiff = 1e-3;
    }
}

/// An inductor between two posts.
///
/// Companion model (trapezoidal rule): a resistor of 2L/dt with a parallel
/// current source carrying the history term.
pub struct Inductor {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    pub inductance: f64,
    pub current: f64,
    comp_resistance: f64,
    voltdiff: f64,
    cur_source_value: f64,
}

impl Inductor {
    pub fn new(p1: Point, p2: Point, inductance: f64) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            inductance,
            current: 0.0,
            comp_resistance: 0.0,
            voltdiff: 0.0,
            cur_source_value: 0.0,
        }
    }
}

impl Element for Inductor {
    fn kind(&self) -> ElementKind {
        ElementKind::Inductor
    }

    fn post_count(&self) -> usize {
        2
    }

    fn get_post(&self, post: usize) -> Point {
        self.posts[post]
    }

    fn set_node(&mut self, post: usize, node: usize) {
        self.nodes[post] = node;
    }

    fn node(&self, post: usize) -> usize {
        self.nodes[post]
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        self.comp_resistance = 2.0 * self.inductance / sys.time_step();
        sys.stamp_resistor(self.nodes[0], self.nodes[1], self.comp_resistance);
        sys.mark_right_side_changes(self.nodes[0]);
        sys.mark_right_side_changes(self.nodes[1]);
    }

    fn start_iteration(&mut self, _dt: f64) {
        self.cur_source_value = self.voltdiff / self.comp_resistance + self.current;
    }

    fn do_step(&mut self, sys: &mut MnaSystem) {
        sys.stamp_current_source(self.nodes[0], self.nodes[1], self.cur_source_value);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
        self.voltdiff = self.volts[0] - self.volts[1];
        if self.comp_resistance > 0.0 {
            self.current = self.voltdiff / self.comp_resistance + self.cur_source_value;
        }
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
        self.current = 0.0;
        self.voltdiff = 0.0;
        self.cur_source_value = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacitor_companion_resistance() {
        let mut c = Capacitor::new(Point::new(0, 0), Point::new(1, 0), 1e-6);
        c.set_node(0, 1);
        c.set_node(1, 2);
        let mut sys = MnaSystem::new(3, 0, 1e-5);
        c.stamp(&mut sys);

        // R_eq = dt / 2C = 1e-5 / 2e-6 = 5 ohms -> G = 0.2 S
        assert!((sys.entry(0, 0) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn capacitor_reset_keeps_perturbation_charge() {
        let mut c = Capacitor::new(Point::new(0, 0), Point::new(1, 0), 1e-6);
        c.reset();
        assert_eq!(c.voltage_diff(), 1e-3);
        assert_eq!(c.current(), 0.0);
    }

    #[test]
    fn inductor_reset_zeroes_current() {
        let mut l = Inductor::new(Point::new(0, 0), Point::new(1, 0), 1e-3);
        l.current = 2.5;
        l.reset();
        assert_eq!(l.current(), 0.0);
    }

    #[test]
    fn resistor_reports_ohms_law_current() {
        let mut r = Resistor::new(Point::new(0, 0), Point::new(1, 0), 100.0);
        r.set_node_voltage(0, 5.0);
        r.set_node_voltage(1, 0.0);
        assert!((r.current() - 0.05).abs() < 1e-12);
    }
}
