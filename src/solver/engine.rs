//! The simulation engine: topology analysis, integrity checks, and the
//! per-timestep solve loop.

use log::{debug, error, info, warn};

use crate::circuit::{CircuitNode, NodeLink, PathFinder, PathMode};
use crate::elements::{Element, ElementKind};
use crate::error::{Result, SimError};

use super::lu::{lu_factor, lu_solve};
use super::matrix::MnaSystem;
use super::{PIVOT_FLOOR, STUB_RESISTANCE, SUB_ITERATION_LIMIT};

/// Tunable solver limits. The defaults suit interactive circuits; builders
/// follow the usual pattern:
///
/// ```
/// use mna_core::SimulatorConfig;
///
/// let config = SimulatorConfig::default().with_sub_iteration_limit(200);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Newton sub-iterations allowed per timestep.
    pub sub_iteration_limit: usize,
    /// Replacement for an exactly zero pivot during factorization.
    pub pivot_floor: f64,
    /// Leak resistance tying unconnected nodes to ground, ohms.
    pub stub_resistance: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sub_iteration_limit: SUB_ITERATION_LIMIT,
            pivot_floor: PIVOT_FLOOR,
            stub_resistance: STUB_RESISTANCE,
        }
    }
}

impl SimulatorConfig {
    pub fn with_sub_iteration_limit(mut self, limit: usize) -> Self {
        self.sub_iteration_limit = limit;
        self
    }

    pub fn with_pivot_floor(mut self, floor: f64) -> Self {
        self.pivot_floor = floor;
        self
    }

    pub fn with_stub_resistance(mut self, r: f64) -> Self {
        self.stub_resistance = r;
        self
    }
}

/// Why a simulation stopped, and the offending element if one was singled
/// out. Once set, every further [`Simulator::step_time`] returns the same
/// error until the topology is rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct StopState {
    pub error: SimError,
    pub element: Option<usize>,
}

/// Callback run after every completed timestep.
pub trait StepObserver {
    fn on_time_step(&mut self, time: f64);
}

/// The circuit simulator.
///
/// Owns the element list, the node arena built from element posts, and the
/// MNA system. [`rebuild_topology`](Self::rebuild_topology) analyzes a new
/// element list; [`step_time`](Self::step_time) advances the simulation by
/// one timestep.
pub struct Simulator {
    elements: Vec<Box<dyn Element>>,
    nodes: Vec<CircuitNode>,
    /// Element index owning each global voltage-source slot.
    voltage_sources: Vec<usize>,
    system: MnaSystem,
    nonlinear: bool,
    time: f64,
    time_step: f64,
    config: SimulatorConfig,
    stopped: Option<StopState>,
    needs_analysis: bool,
    sub_iterations: usize,
    observers: Vec<Box<dyn StepObserver>>,
}

impl Simulator {
    /// An empty simulator with the default configuration.
    pub fn new(time_step: f64) -> Self {
        Self::with_config(time_step, SimulatorConfig::default())
    }

    pub fn with_config(time_step: f64, config: SimulatorConfig) -> Self {
        Self {
            elements: Vec::new(),
            nodes: Vec::new(),
            voltage_sources: Vec::new(),
            system: MnaSystem::new(1, 0, time_step),
            nonlinear: false,
            time: 0.0,
            time_step,
            config,
            stopped: None,
            // the node arena is only valid after an analysis pass
            needs_analysis: true,
            sub_iterations: 0,
            observers: Vec::new(),
        }
    }

    /// Replace the element list and re-analyze the circuit. Clears any
    /// previous stop state. Solved element state (capacitor charge,
    /// inductor current) carries over through the elements themselves.
    pub fn rebuild_topology(&mut self, elements: Vec<Box<dyn Element>>) -> Result<()> {
        self.elements = elements;
        self.stopped = None;
        self.analyze()
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Change the timestep. Companion models bake the timestep into their
    /// stamps, so the system is re-analyzed on the next step.
    pub fn set_time_step(&mut self, time_step: f64) {
        self.time_step = time_step;
        self.needs_analysis = true;
    }

    /// Sub-iterations the last completed timestep took. 1 for linear
    /// circuits.
    pub fn sub_iterations(&self) -> usize {
        self.sub_iterations
    }

    /// The sticky stop state, if the simulation has failed.
    pub fn stop_state(&self) -> Option<&StopState> {
        self.stopped.as_ref()
    }

    pub fn element(&self, i: usize) -> &dyn Element {
        self.elements[i].as_ref()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn add_observer(&mut self, observer: Box<dyn StepObserver>) {
        self.observers.push(observer);
    }

    /// Reset time and all element state to the initial conditions.
    pub fn reset(&mut self) {
        self.time = 0.0;
        for elm in &mut self.elements {
            elm.reset();
        }
        self.stopped = None;
        self.needs_analysis = true;
    }

    /// Record a fatal condition; all further stepping fails with it.
    fn stop(&mut self, err: SimError, element: Option<usize>) -> Result<()> {
        error!("simulation stopped: {}", err);
        self.stopped = Some(StopState {
            error: err.clone(),
            element,
        });
        Err(err)
    }

    /// Rebuild nodes, sources, and the MNA system from the element list.
    ///
    /// The passes run in order: ground designation, post-to-node merging,
    /// voltage-source numbering, stamping, connectivity closure, integrity
    /// checks, row simplification, and (for linear circuits) a one-time
    /// factorization.
    fn analyze(&mut self) -> Result<()> {
        self.needs_analysis = false;

        // Nothing to analyze: collapse to an empty system with just the
        // ground node so stepping stays a cheap no-op.
        if self.elements.is_empty() {
            self.nodes.clear();
            self.nodes.push(CircuitNode::synthetic(false));
            self.voltage_sources.clear();
            self.nonlinear = false;
            self.system = MnaSystem::new(1, 0, self.time_step);
            self.system.set_time(self.time);
            return Ok(());
        }

        // Ground designation: an explicit ground element wins; otherwise a
        // rail implies a synthetic ground; otherwise the first voltage
        // source's terminal 0 becomes ground; otherwise everything floats
        // against a synthetic reference.
        let mut got_ground = false;
        let mut got_rail = false;
        let mut volt: Option<usize> = None;
        for (i, ce) in self.elements.iter().enumerate() {
            match ce.kind() {
                ElementKind::Ground => got_ground = true,
                ElementKind::Rail => got_rail = true,
                ElementKind::VoltageSource if volt.is_none() => volt = Some(i),
                _ => {}
            }
        }

        self.nodes.clear();
        match volt {
            Some(vi) if !got_ground && !got_rail => {
                let pt = self.elements[vi].get_post(0);
                self.nodes.push(CircuitNode::at(pt));
            }
            _ => self.nodes.push(CircuitNode::synthetic(false)),
        }

        // Merge element posts into nodes by position and allocate internal
        // nodes.
        self.nonlinear = false;
        for (i, ce) in self.elements.iter_mut().enumerate() {
            if ce.nonlinear() {
                self.nonlinear = true;
            }
            let posts = ce.post_count();
            for j in 0..posts {
                let pt = ce.get_post(j);
                match self.nodes.iter().position(|n| n.pos == Some(pt)) {
                    Some(k) => {
                        self.nodes[k].links.push(NodeLink { element: i, post: j });
                        ce.set_node(j, k);
                        if k == 0 {
                            ce.set_node_voltage(j, 0.0);
                        }
                    }
                    None => {
                        let mut cn = CircuitNode::at(pt);
                        cn.links.push(NodeLink { element: i, post: j });
                        self.nodes.push(cn);
                        ce.set_node(j, self.nodes.len() - 1);
                    }
                }
            }
            for j in 0..ce.internal_node_count() {
                let mut cn = CircuitNode::synthetic(true);
                cn.links.push(NodeLink {
                    element: i,
                    post: posts + j,
                });
                self.nodes.push(cn);
                ce.set_node(posts + j, self.nodes.len() - 1);
            }
        }

        // Number every voltage source globally.
        self.voltage_sources.clear();
        for (i, ce) in self.elements.iter_mut().enumerate() {
            for n in 0..ce.voltage_source_count() {
                ce.set_voltage_source(n, self.voltage_sources.len());
                self.voltage_sources.push(i);
            }
        }

        debug!(
            "analyzing: {} elements, {} nodes, {} voltage sources, nonlinear: {}",
            self.elements.len(),
            self.nodes.len(),
            self.voltage_sources.len(),
            self.nonlinear
        );

        self.system = MnaSystem::new(self.nodes.len(), self.voltage_sources.len(), self.time_step);
        self.system.set_time(self.time);
        for ce in &mut self.elements {
            ce.stamp(&mut self.system);
        }
        if let Some(err) = self.system.take_fault() {
            return self.stop(err, None);
        }

        self.connect_unconnected_nodes();

        match self.check_integrity() {
            Ok(resets) => {
                for i in resets {
                    self.elements[i].reset();
                }
            }
            Err(st) => return self.stop(st.error, st.element),
        }

        if let Err(err) = self.system.simplify() {
            return self.stop(err, None);
        }

        // Linear circuits factor once and reuse the factors every step.
        if !self.nonlinear {
            let n = self.system.size;
            if !lu_factor(
                &mut self.system.matrix,
                n,
                &mut self.system.permute,
                self.config.pivot_floor,
            ) {
                return self.stop(SimError::SingularMatrix, None);
            }
        }

        Ok(())
    }

    /// Grow the set of nodes reachable from ground; any node left outside
    /// the closure gets a large leak resistance to ground so the matrix
    /// stays nonsingular.
    fn connect_unconnected_nodes(&mut self) {
        let n = self.nodes.len();
        let mut closure = vec![false; n];
        closure[0] = true;
        let mut changed = true;
        while changed {
            changed = false;
            for ce in &self.elements {
                let posts = ce.post_count();
                let total = posts + ce.internal_node_count();
                for j in 0..total {
                    if !closure[ce.node(j)] {
                        if j < posts && ce.has_ground_connection(j) {
                            closure[ce.node(j)] = true;
                            changed = true;
                        }
                        continue;
                    }
                    for k in 0..total {
                        if j == k {
                            continue;
                        }
                        let kn = ce.node(k);
                        if ce.get_connection(j, k) && !closure[kn] {
                            closure[kn] = true;
                            changed = true;
                        }
                    }
                }
            }
            if changed {
                continue;
            }

            // one node at a time, since connecting it may pull others in
            for i in 0..n {
                if !closure[i] && !self.nodes[i].internal {
                    info!("node {} unconnected; adding leak to ground", i);
                    self.system
                        .stamp_resistor(0, i, self.config.stub_resistance);
                    closure[i] = true;
                    changed = true;
                    break;
                }
            }
        }
    }

    /// Topology sanity checks via path search: inductors and current
    /// sources need a current path, voltage sources and wires must not form
    /// a resistance-free loop, capacitors must not sit in a source loop.
    /// Non-fatal problems (dangling inductor, shorted capacitor) are
    /// returned as a list of elements to reset instead of stopping.
    fn check_integrity(&self) -> std::result::Result<Vec<usize>, StopState> {
        let n = self.nodes.len();
        let mut resets = Vec::new();
        for (i, ce) in self.elements.iter().enumerate() {
            match ce.kind() {
                ElementKind::Inductor => {
                    let fpi = PathFinder::new(PathMode::Inductor, i, ce.node(1), &self.elements, n);
                    // a shallow probe first, to keep big circuits fast
                    if !fpi.find_path_bounded(ce.node(0), 5) && !fpi.find_path(ce.node(0)) {
                        warn!("inductor {} has no current path; resetting", i);
                        resets.push(i);
                    }
                }
                ElementKind::CurrentSource => {
                    let fpi = PathFinder::new(PathMode::Inductor, i, ce.node(1), &self.elements, n);
                    if !fpi.find_path(ce.node(0)) {
                        return Err(StopState {
                            error: SimError::NoCurrentPath,
                            element: Some(i),
                        });
                    }
                }
                ElementKind::Capacitor => {
                    let fpi = PathFinder::new(PathMode::Short, i, ce.node(1), &self.elements, n);
                    if fpi.find_path(ce.node(0)) {
                        warn!("capacitor {} shorted; resetting", i);
                        resets.push(i);
                    } else {
                        let fpi =
                            PathFinder::new(PathMode::CapVoltage, i, ce.node(1), &self.elements, n);
                        if fpi.find_path(ce.node(0)) {
                            return Err(StopState {
                                error: SimError::CapacitorLoop,
                                element: Some(i),
                            });
                        }
                    }
                }
                _ => {}
            }

            if (ce.kind().is_voltage_source() && ce.post_count() == 2) || ce.is_wire() {
                let fpi = PathFinder::new(PathMode::Voltage, i, ce.node(1), &self.elements, n);
                if fpi.find_path(ce.node(0)) {
                    return Err(StopState {
                        error: SimError::VoltageSourceLoop,
                        element: Some(i),
                    });
                }
            }
        }
        Ok(resets)
    }

    /// Advance the simulation by one timestep.
    ///
    /// Runs the Newton sub-iteration loop: restore the stamped system,
    /// let every element contribute its per-step terms, factor if needed,
    /// solve, and distribute results. Linear circuits converge in a single
    /// pass.
    pub fn step_time(&mut self) -> Result<()> {
        if let Some(st) = &self.stopped {
            return Err(st.error.clone());
        }
        if self.needs_analysis {
            self.analyze()?;
        }

        self.system.set_time(self.time);
        for elm in &mut self.elements {
            elm.start_iteration(self.time_step);
        }

        let limit = self.config.sub_iteration_limit;
        let size = self.system.size;
        let node_rows = self.nodes.len() - 1;
        let mut subiter = 0;
        while subiter < limit {
            self.sub_iterations = subiter + 1;
            self.system.converged = true;
            self.system.restore_right_side();
            if self.nonlinear {
                self.system.restore_matrix();
            }

            for elm in &mut self.elements {
                elm.do_step(&mut self.system);
            }
            if let Some(err) = self.system.take_fault() {
                return self.stop(err, None);
            }
            if !self.system.is_finite() {
                return self.stop(SimError::NonFiniteMatrix, None);
            }

            if self.nonlinear {
                if self.system.converged && subiter > 0 {
                    break;
                }
                if !lu_factor(
                    &mut self.system.matrix,
                    size,
                    &mut self.system.permute,
                    self.config.pivot_floor,
                ) {
                    return self.stop(SimError::SingularMatrix, None);
                }
            }

            lu_solve(
                &self.system.matrix,
                size,
                &self.system.permute,
                &mut self.system.right_side,
            );

            // Distribute results: node rows back to element terminals,
            // voltage-source rows back to their owners as currents.
            for j in 0..self.system.full_size {
                let res = self.system.result(j);
                if res.is_nan() {
                    self.system.clear_converged();
                    break;
                }
                if j < node_rows {
                    for link in &self.nodes[j + 1].links {
                        self.elements[link.element].set_node_voltage(link.post, res);
                    }
                } else {
                    let ji = j - node_rows;
                    self.elements[self.voltage_sources[ji]].set_voltage_source_current(ji, res);
                }
            }

            if !self.nonlinear {
                break;
            }
            subiter += 1;
        }

        if subiter == limit {
            return self.stop(
                SimError::ConvergenceFailed {
                    iterations: subiter,
                },
                None,
            );
        }

        self.time += self.time_step;
        self.system.set_time(self.time);
        for obs in &mut self.observers {
            obs.on_time_step(self.time);
        }
        Ok(())
    }
}
