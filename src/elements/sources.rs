//! Independent sources: two-terminal voltage sources, rails, grounds, and
//! current sources.

use std::f64::consts::TAU;

use crate::circuit::Point;
use crate::solver::MnaSystem;

use super::{Element, ElementKind};

/// Driving function for a voltage source or rail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// A fixed voltage.
    Dc(f64),
    /// `offset + amplitude * sin(TAU * frequency * t + phase)`.
    Sine {
        amplitude: f64,
        frequency: f64,
        offset: f64,
        phase: f64,
    },
}

impl Waveform {
    pub fn value(&self, t: f64) -> f64 {
        match *self {
            Waveform::Dc(v) => v,
            Waveform::Sine {
                amplitude,
                frequency,
                offset,
                phase,
            } => offset + amplitude * (TAU * frequency * t + phase).sin(),
        }
    }

    fn is_dc(&self) -> bool {
        matches!(self, Waveform::Dc(_))
    }
}

/// A two-terminal independent voltage source. Terminal 1 is the positive
/// terminal.
///
/// DC sources stamp their value once; time-varying sources flag their row
/// and update it every step.
pub struct VoltageSource {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    vs: usize,
    pub waveform: Waveform,
    current: f64,
}

impl VoltageSource {
    pub fn new(p1: Point, p2: Point, waveform: Waveform) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            vs: 0,
            waveform,
            current: 0.0,
        }
    }

    /// A DC source driving terminal 1 to `volts` above terminal 0.
    pub fn dc(p1: Point, p2: Point, volts: f64) -> Self {
        Self::new(p1, p2, Waveform::Dc(volts))
    }

    /// A zero-offset, zero-phase sine source.
    pub fn sine(p1: Point, p2: Point, amplitude: f64, frequency: f64) -> Self {
        Self::new(
            p1,
            p2,
            Waveform::Sine {
                amplitude,
                frequency,
                offset: 0.0,
                phase: 0.0,
            },
        )
    }
}

impl Element for VoltageSource {
    fn kind(&self) -> ElementKind {
        ElementKind::VoltageSource
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

    fn stamp(&mut self, sys: &mut MnaSystem) {
        match self.waveform {
            Waveform::Dc(v) => {
                sys.stamp_voltage_source(self.nodes[0], self.nodes[1], self.vs, v);
            }
            _ => {
                sys.stamp_voltage_source_dynamic(self.nodes[0], self.nodes[1], self.vs);
            }
        }
    }

    fn do_step(&mut self, sys: &mut MnaSystem) {
        if !self.waveform.is_dc() {
            let v = self.waveform.value(sys.time());
            sys.update_voltage_source(self.vs, v);
        }
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

/// A one-terminal source referenced to ground.
pub struct Rail {
    post: Point,
    node: usize,
    volt: f64,
    vs: usize,
    pub waveform: Waveform,
    current: f64,
}

impl Rail {
    pub fn new(post: Point, waveform: Waveform) -> Self {
        Self {
            post,
            node: 0,
            volt: 0.0,
            vs: 0,
            waveform,
            current: 0.0,
        }
    }

    pub fn dc(post: Point, volts: f64) -> Self {
        Self::new(post, Waveform::Dc(volts))
    }
}

impl Element for Rail {
    fn kind(&self) -> ElementKind {
        ElementKind::Rail
    }

    fn post_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn get_post(&self, _post: usize) -> Point {
        self.post
    }

    fn set_node(&mut self, _post: usize, node: usize) {
        self.node = node;
    }

    fn node(&self, _post: usize) -> usize {
        self.node
    }

    fn set_voltage_source(&mut self, _n: usize, vs: usize) {
        self.vs = vs;
    }

    fn has_ground_connection(&self, _post: usize) -> bool {
        true
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        match self.waveform {
            Waveform::Dc(v) => {
                sys.stamp_voltage_source(0, self.node, self.vs, v);
            }
            _ => {
                sys.stamp_voltage_source_dynamic(0, self.node, self.vs);
            }
        }
    }

    fn do_step(&mut self, sys: &mut MnaSystem) {
        if !self.waveform.is_dc() {
            let v = self.waveform.value(sys.time());
            sys.update_voltage_source(self.vs, v);
        }
    }

    fn set_node_voltage(&mut self, _post: usize, v: f64) {
        self.volt = v;
    }

    fn set_voltage_source_current(&mut self, vs: usize, current: f64) {
        if vs == self.vs {
            self.current = current;
        }
    }

    fn voltage(&self, _post: usize) -> f64 {
        self.volt
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volt = 0.0;
        self.current = 0.0;
    }
}

/// A ground reference. Its terminal is pinned to 0 V through a voltage
/// source so the current into ground is observable.
pub struct Ground {
    post: Point,
    node: usize,
    vs: usize,
    current: f64,
}

impl Ground {
    pub fn new(post: Point) -> Self {
        Self {
            post,
            node: 0,
            vs: 0,
            current: 0.0,
        }
    }
}

impl Element for Ground {
    fn kind(&self) -> ElementKind {
        ElementKind::Ground
    }

    fn post_count(&self) -> usize {
        1
    }

    fn voltage_source_count(&self) -> usize {
        1
    }

    fn get_post(&self, _post: usize) -> Point {
        self.post
    }

    fn set_node(&mut self, _post: usize, node: usize) {
        self.node = node;
    }

    fn node(&self, _post: usize) -> usize {
        self.node
    }

    fn set_voltage_source(&mut self, _n: usize, vs: usize) {
        self.vs = vs;
    }

    fn has_ground_connection(&self, _post: usize) -> bool {
        true
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        sys.stamp_voltage_source(0, self.node, self.vs, 0.0);
    }

    fn set_node_voltage(&mut self, _post: usize, _v: f64) {}

    fn set_voltage_source_current(&mut self, vs: usize, current: f64) {
        if vs == self.vs {
            self.current = current;
        }
    }

    fn voltage(&self, _post: usize) -> f64 {
        0.0
    }

    fn current(&self) -> f64 {
        -self.current
    }

    fn reset(&mut self) {
        self.current = 0.0;
    }
}

/// An ideal current source pushing a fixed current from terminal 0 to
/// terminal 1.
pub struct CurrentSource {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    pub current_value: f64,
}

impl CurrentSource {
    pub fn new(p1: Point, p2: Point, current: f64) -> Self {
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            current_value: current,
        }
    }
}

impl Element for CurrentSource {
    fn kind(&self) -> ElementKind {
        ElementKind::CurrentSource
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
        sys.stamp_current_source(self.nodes[0], self.nodes[1], self.current_value);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current_value
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
    }
}
