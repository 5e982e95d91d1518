//! The MNA linear system and the stamping primitives elements use.

use log::warn;

use crate::error::SimError;

/// Terminal classification of a matrix row/unknown after simplification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowKind {
    /// Survives into the reduced matrix.
    #[default]
    Normal,
    /// The unknown is a known constant.
    Const,
    /// The unknown equals another unknown.
    Equal,
}

/// Per-row metadata produced by the row simplifier.
///
/// One index carries both roles of the MNA system: the equation (row) and
/// the unknown (column). A row whose equation was consumed by simplification
/// is flagged `dropped` while its column keeps its [`RowKind`]
/// classification.
#[derive(Debug, Clone, Default)]
pub struct RowInfo {
    pub kind: RowKind,
    /// Value of the unknown when `kind` is [`RowKind::Const`].
    pub const_value: f64,
    /// Row index of the equal unknown when `kind` is [`RowKind::Equal`].
    pub equal_target: usize,
    /// Column in the reduced matrix; `None` once resolved to a constant.
    pub mapped_col: Option<usize>,
    /// Row in the reduced matrix; `None` for dropped rows.
    pub mapped_row: Option<usize>,
    /// The equation was eliminated by substitution.
    pub dropped: bool,
    /// The right side of this row changes every step; excluded from
    /// one-time simplification.
    pub rhs_changes: bool,
    /// Matrix entries in this row change every sub-iteration; forces
    /// re-factorization and excludes the row from simplification.
    pub lhs_changes: bool,
}

/// The MNA system `A x = b` plus the bookkeeping needed to re-stamp and
/// re-solve it every timestep.
///
/// This is the explicit context handed to every element call. Stamp
/// primitives address nodes by node index, where index 0 is ground and is
/// silently ignored; voltage-source rows live past the node rows. Once the
/// row simplifier has run (`needs_map`), `stamp_matrix`/`stamp_right_side`
/// apply the [`RowInfo`] remapping transparently.
#[derive(Debug)]
pub struct MnaSystem {
    /// Reduced system matrix (row-major, `size` x `size`).
    pub(crate) matrix: Vec<f64>,
    /// Reduced right side.
    pub(crate) right_side: Vec<f64>,
    /// Snapshot restored every sub-iteration for nonlinear solves.
    pub(crate) orig_matrix: Vec<f64>,
    pub(crate) orig_right_side: Vec<f64>,
    /// Metadata for every row of the full (pre-reduction) system.
    pub(crate) row_info: Vec<RowInfo>,
    /// Pivot permutation from LU factorization.
    pub(crate) permute: Vec<usize>,
    /// Current (reduced) dimension.
    pub(crate) size: usize,
    /// Dimension before simplification.
    pub(crate) full_size: usize,
    /// Whether stamps must be remapped through [`RowInfo`].
    pub(crate) needs_map: bool,
    /// Node count including ground.
    num_nodes: usize,
    time: f64,
    time_step: f64,
    /// Cleared by nonlinear elements during `do_step` when their operating
    /// point moved too far; forces another sub-iteration.
    pub(crate) converged: bool,
    /// Configuration fault recorded by a stamp primitive. Elements never
    /// return errors; the engine checks and escalates this centrally.
    fault: Option<SimError>,
}

impl MnaSystem {
    /// Allocate a zeroed system for `num_nodes` nodes (including ground)
    /// and `vs_count` voltage sources.
    pub fn new(num_nodes: usize, vs_count: usize, time_step: f64) -> Self {
        let size = (num_nodes - 1) + vs_count;
        Self {
            matrix: vec![0.0; size * size],
            right_side: vec![0.0; size],
            orig_matrix: vec![0.0; size * size],
            orig_right_side: vec![0.0; size],
            row_info: vec![RowInfo::default(); size],
            permute: vec![0; size],
            size,
            full_size: size,
            needs_map: false,
            num_nodes,
            time: 0.0,
            time_step,
            converged: true,
            fault: None,
        }
    }

    /// Current (reduced) matrix dimension.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Dimension before row simplification.
    pub fn full_size(&self) -> usize {
        self.full_size
    }

    /// Current simulation time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Simulation timestep in seconds.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub(crate) fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Signal that this sub-iteration has not converged. Nonlinear elements
    /// call this from `do_step` when their operating point moved beyond
    /// tolerance.
    pub fn clear_converged(&mut self) {
        self.converged = false;
    }

    pub(crate) fn take_fault(&mut self) -> Option<SimError> {
        self.fault.take()
    }

    /// Matrix entry of the reduced system, by reduced row/column.
    pub fn entry(&self, row: usize, col: usize) -> f64 {
        self.matrix[row * self.size + col]
    }

    /// Right-side entry of the reduced system.
    pub fn right_side_entry(&self, row: usize) -> f64 {
        self.right_side[row]
    }

    /// The matrix row owned by voltage source `vs`, in node-index terms.
    pub fn vs_row(&self, vs: usize) -> usize {
        self.num_nodes + vs
    }

    /// Solved value of full-system row `j`: a recorded constant, or the
    /// entry of the solution vector it mapped to.
    pub(crate) fn result(&self, j: usize) -> f64 {
        let ri = &self.row_info[j];
        if ri.kind == RowKind::Const {
            ri.const_value
        } else {
            match ri.mapped_col {
                Some(col) => self.right_side[col],
                None => f64::NAN,
            }
        }
    }

    pub(crate) fn restore_right_side(&mut self) {
        self.right_side.copy_from_slice(&self.orig_right_side);
    }

    pub(crate) fn restore_matrix(&mut self) {
        self.matrix.copy_from_slice(&self.orig_matrix);
    }

    /// Check every matrix entry is finite.
    pub(crate) fn is_finite(&self) -> bool {
        self.matrix[..self.size * self.size]
            .iter()
            .all(|x| x.is_finite())
    }

    // ============ Stamping primitives ============

    /// Add `x` at (row `i`, column `j`), meaning a voltage change of dv at
    /// node `j` increases the current into node `i` by `x * dv`. Indices are
    /// node indices; ground (0) is a no-op.
    pub fn stamp_matrix(&mut self, i: usize, j: usize, x: f64) {
        if i == 0 || j == 0 {
            return;
        }
        let (mi, mj);
        if self.needs_map {
            let Some(row) = self.row_info[i - 1].mapped_row else {
                return;
            };
            let ri = &self.row_info[j - 1];
            if ri.kind == RowKind::Const {
                // the unknown is already resolved; fold into the right side
                self.right_side[row] -= x * ri.const_value;
                return;
            }
            let Some(col) = ri.mapped_col else {
                return;
            };
            mi = row;
            mj = col;
        } else {
            mi = i - 1;
            mj = j - 1;
        }
        self.matrix[mi * self.size + mj] += x;
    }

    /// Add `x` to the right side of row `i`, representing an independent
    /// current source flowing into node `i`.
    pub fn stamp_right_side(&mut self, i: usize, x: f64) {
        if i == 0 {
            return;
        }
        let row = if self.needs_map {
            match self.row_info[i - 1].mapped_row {
                Some(row) => row,
                None => return,
            }
        } else {
            i - 1
        };
        self.right_side[row] += x;
    }

    /// Declare that the right side of row `i` changes in `do_step`,
    /// excluding it from one-time simplification.
    pub fn mark_right_side_changes(&mut self, i: usize) {
        if i > 0 {
            self.row_info[i - 1].rhs_changes = true;
        }
    }

    /// Declare that the matrix entries of row `i` change in `do_step`,
    /// forcing re-factorization every sub-iteration.
    pub fn stamp_nonlinear(&mut self, i: usize) {
        if i > 0 {
            self.row_info[i - 1].lhs_changes = true;
        }
    }

    /// Stamp a resistor of `r` ohms between two nodes. A zero or non-finite
    /// conductance is a fatal configuration fault.
    pub fn stamp_resistor(&mut self, n1: usize, n2: usize, r: f64) {
        let r0 = 1.0 / r;
        if r == 0.0 || !r0.is_finite() {
            warn!("bad resistance {} between nodes {} and {}", r, n1, n2);
            self.fault = Some(SimError::bad_configuration(format!(
                "bad resistance {} between nodes {} and {}",
                r, n1, n2
            )));
            return;
        }
        self.stamp_conductance(n1, n2, r0);
    }

    /// Stamp a conductance of `g` siemens between two nodes.
    pub fn stamp_conductance(&mut self, n1: usize, n2: usize, g: f64) {
        self.stamp_matrix(n1, n1, g);
        self.stamp_matrix(n2, n2, g);
        self.stamp_matrix(n1, n2, -g);
        self.stamp_matrix(n2, n1, -g);
    }

    /// Stamp a current of `i` amperes flowing from `n1` to `n2`.
    pub fn stamp_current_source(&mut self, n1: usize, n2: usize, i: f64) {
        self.stamp_right_side(n1, -i);
        self.stamp_right_side(n2, i);
    }

    /// Stamp independent voltage source `vs` from `n1` to `n2` (terminal
    /// `n2` positive), amount `v`.
    pub fn stamp_voltage_source(&mut self, n1: usize, n2: usize, vs: usize, v: f64) {
        let vn = self.vs_row(vs);
        self.stamp_matrix(vn, n1, -1.0);
        self.stamp_matrix(vn, n2, 1.0);
        self.stamp_right_side(vn, v);
        self.stamp_matrix(n1, vn, 1.0);
        self.stamp_matrix(n2, vn, -1.0);
    }

    /// Stamp voltage source `vs` whose value is updated every step via
    /// [`update_voltage_source`](Self::update_voltage_source).
    pub fn stamp_voltage_source_dynamic(&mut self, n1: usize, n2: usize, vs: usize) {
        let vn = self.vs_row(vs);
        self.stamp_matrix(vn, n1, -1.0);
        self.stamp_matrix(vn, n2, 1.0);
        self.mark_right_side_changes(vn);
        self.stamp_matrix(n1, vn, 1.0);
        self.stamp_matrix(n2, vn, -1.0);
    }

    /// Set this step's value for a dynamically stamped voltage source.
    pub fn update_voltage_source(&mut self, vs: usize, v: f64) {
        let vn = self.vs_row(vs);
        self.stamp_right_side(vn, v);
    }

    /// Control voltage source `vs` with the voltage from `n1` to `n2`
    /// (must also stamp the source itself).
    pub fn stamp_vcvs(&mut self, n1: usize, n2: usize, coef: f64, vs: usize) {
        let vn = self.vs_row(vs);
        self.stamp_matrix(vn, n1, coef);
        self.stamp_matrix(vn, n2, -coef);
    }

    /// Current from `cn1` to `cn2` proportional to the voltage from `vn1`
    /// to `vn2` with transconductance `g`.
    pub fn stamp_vc_current_source(&mut self, cn1: usize, cn2: usize, vn1: usize, vn2: usize, g: f64) {
        self.stamp_matrix(cn1, vn1, g);
        self.stamp_matrix(cn2, vn2, g);
        self.stamp_matrix(cn1, vn2, -g);
        self.stamp_matrix(cn2, vn1, -g);
    }

    /// Current from `n1` to `n2` proportional to the current through
    /// voltage source `vs`.
    pub fn stamp_cccs(&mut self, n1: usize, n2: usize, vs: usize, gain: f64) {
        let vn = self.vs_row(vs);
        self.stamp_matrix(n1, vn, gain);
        self.stamp_matrix(n2, vn, -gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resistor_stamp_is_reciprocal() {
        // Three nodes (incl. ground), no sources: a 2x2 system.
        let mut sys = MnaSystem::new(3, 0, 1e-5);
        sys.stamp_resistor(1, 2, 100.0);

        let g = 0.01;
        assert!((sys.entry(0, 0) - g).abs() < 1e-15);
        assert!((sys.entry(1, 1) - g).abs() < 1e-15);
        assert!((sys.entry(0, 1) + g).abs() < 1e-15);
        assert!((sys.entry(1, 0) + g).abs() < 1e-15);
        // off-diagonals are each other's negatives and the block is symmetric
        assert_eq!(sys.entry(0, 1), sys.entry(1, 0));
        assert_eq!(sys.entry(0, 1), -sys.entry(0, 0));
    }

    #[test]
    fn ground_stamps_are_ignored() {
        let mut sys = MnaSystem::new(2, 0, 1e-5);
        sys.stamp_resistor(0, 1, 50.0);
        assert!((sys.entry(0, 0) - 0.02).abs() < 1e-15);

        sys.stamp_right_side(0, 1.0);
        assert_eq!(sys.right_side_entry(0), 0.0);
    }

    #[test]
    fn zero_resistance_records_fault() {
        let mut sys = MnaSystem::new(3, 0, 1e-5);
        sys.stamp_resistor(1, 2, 0.0);
        assert!(sys.take_fault().is_some());
        // nothing was stamped
        assert_eq!(sys.entry(0, 0), 0.0);
    }

    #[test]
    fn vcvs_stamps_the_controlling_pair_into_the_source_row() {
        let mut sys = MnaSystem::new(3, 1, 1e-5);
        sys.stamp_vcvs(1, 2, 0.5, 0);

        // source row: 0.5 * (V(n1) - V(n2)) enters the KVL constraint
        assert_eq!(sys.entry(2, 0), 0.5);
        assert_eq!(sys.entry(2, 1), -0.5);
    }

    #[test]
    fn vc_current_source_stamp_is_antisymmetric_in_its_pairs() {
        let mut sys = MnaSystem::new(5, 0, 1e-5);
        sys.stamp_vc_current_source(1, 2, 3, 4, 0.1);

        // g * (V(vn1) - V(vn2)) flows into cn1 and out of cn2
        assert_eq!(sys.entry(0, 2), 0.1);
        assert_eq!(sys.entry(1, 3), 0.1);
        assert_eq!(sys.entry(0, 3), -0.1);
        assert_eq!(sys.entry(1, 2), -0.1);
    }

    #[test]
    fn cccs_couples_node_rows_to_the_source_current_column() {
        let mut sys = MnaSystem::new(3, 1, 1e-5);
        sys.stamp_cccs(1, 2, 0, 2.0);

        // gain times the source current flows from n1 to n2
        assert_eq!(sys.entry(0, 2), 2.0);
        assert_eq!(sys.entry(1, 2), -2.0);
    }

    #[test]
    fn voltage_source_rows_sit_past_node_rows() {
        let mut sys = MnaSystem::new(3, 1, 1e-5);
        assert_eq!(sys.size(), 3);
        sys.stamp_voltage_source(1, 2, 0, 5.0);

        // KVL row: -V(n1) + V(n2) = 5
        assert_eq!(sys.entry(2, 0), -1.0);
        assert_eq!(sys.entry(2, 1), 1.0);
        assert_eq!(sys.right_side_entry(2), 5.0);
        // KCL columns
        assert_eq!(sys.entry(0, 2), 1.0);
        assert_eq!(sys.entry(1, 2), -1.0);
    }
}
