//! Junction diode with exponential Shockley characteristic.

use crate::circuit::Point;
use crate::solver::MnaSystem;

use super::{Element, ElementKind};

/// Default saturation (leakage) current, amps.
const DEFAULT_LEAKAGE: f64 = 1e-14;

/// Default forward voltage drop at 1 A, volts.
const DEFAULT_FWDROP: f64 = 0.805904783;

/// A junction diode, terminal 0 anode, terminal 1 cathode.
///
/// Each sub-iteration linearizes the Shockley equation around the previous
/// voltage estimate and stamps the equivalent conductance and current
/// source. Voltage updates are damped through a critical-voltage limiter so
/// the exponential cannot overflow and Newton iteration stays stable.
pub struct Diode {
    posts: [Point; 2],
    nodes: [usize; 2],
    volts: [f64; 2],
    leakage: f64,
    /// Thermal-ish voltage derived from the forward drop; not the physical
    /// kT/q.
    vt: f64,
    vd_coef: f64,
    vcrit: f64,
    last_voltdiff: f64,
    current: f64,
}

impl Diode {
    pub fn new(p1: Point, p2: Point) -> Self {
        Self::with_model(p1, p2, DEFAULT_LEAKAGE, DEFAULT_FWDROP)
    }

    /// Build a diode with an explicit leakage current and forward drop.
    pub fn with_model(p1: Point, p2: Point, leakage: f64, fwdrop: f64) -> Self {
        let vd_coef = (1.0 / leakage + 1.0).ln() / fwdrop;
        let vt = 1.0 / vd_coef;
        // critical voltage: where the exponential's curvature takes over
        let vcrit = vt * (vt / (2.0f64.sqrt() * leakage)).ln();
        Self {
            posts: [p1, p2],
            nodes: [0, 0],
            volts: [0.0, 0.0],
            leakage,
            vt,
            vd_coef,
            vcrit,
            last_voltdiff: 0.0,
            current: 0.0,
        }
    }

    /// Damp a proposed junction voltage so one Newton step cannot overshoot
    /// into exponential overflow. Flags non-convergence when it intervenes.
    fn limit_step(&self, mut vnew: f64, vold: f64, sys: &mut MnaSystem) -> f64 {
        if vnew > self.vcrit && (vnew - vold).abs() > 2.0 * self.vt {
            if vold > 0.0 {
                let arg = 1.0 + (vnew - vold) / self.vt;
                if arg > 0.0 {
                    vnew = vold + self.vt * arg.ln();
                } else {
                    vnew = self.vcrit;
                }
            } else {
                vnew = self.vt * (vnew / self.vt).ln();
            }
            sys.clear_converged();
        }
        vnew
    }
}

impl Element for Diode {
    fn kind(&self) -> ElementKind {
        ElementKind::Diode
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

    fn nonlinear(&self) -> bool {
        true
    }

    fn stamp(&mut self, sys: &mut MnaSystem) {
        sys.stamp_nonlinear(self.nodes[0]);
        sys.stamp_nonlinear(self.nodes[1]);
    }

    fn do_step(&mut self, sys: &mut MnaSystem) {
        let mut vnew = self.volts[0] - self.volts[1];
        if (vnew - self.last_voltdiff).abs() > 0.01 {
            sys.clear_converged();
        }
        vnew = self.limit_step(vnew, self.last_voltdiff, sys);
        self.last_voltdiff = vnew;

        let eval = (self.vd_coef * vnew).exp();
        let geq = self.vd_coef * self.leakage * eval;
        let nc = (eval - 1.0) * self.leakage - geq * vnew;
        sys.stamp_conductance(self.nodes[0], self.nodes[1], geq);
        sys.stamp_current_source(self.nodes[0], self.nodes[1], nc);
    }

    fn set_node_voltage(&mut self, post: usize, v: f64) {
        self.volts[post] = v;
        let vd = self.volts[0] - self.volts[1];
        self.current = self.leakage * ((self.vd_coef * vd).exp() - 1.0);
    }

    fn voltage(&self, post: usize) -> f64 {
        self.volts[post]
    }

    fn current(&self) -> f64 {
        self.current
    }

    fn reset(&mut self) {
        self.volts = [0.0, 0.0];
        self.last_voltdiff = 0.0;
        self.current = 0.0;
    }
}
