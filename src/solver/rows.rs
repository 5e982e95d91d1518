//! Row simplification: eliminate provably constant or equal unknowns
//! before factorization.
//!
//! Most wires and shorts collapse to equalities rather than occupying
//! factorization work, which is what makes interactive-rate solving
//! tractable. The pass runs once per topology build.

use log::{debug, trace};

use super::matrix::{MnaSystem, RowKind};
use crate::error::{Result, SimError};

/// Bound on EQUAL-chain hops; a chain longer than this is cyclic.
const EQUAL_CHAIN_LIMIT: usize = 100;

impl MnaSystem {
    /// Reduce the system in place.
    ///
    /// Scans for rows with at most two nonzero, non-constant entries: a
    /// single entry pins its unknown to a constant, two exactly negated
    /// entries with a zero adjusted right side make their unknowns equal.
    /// Resolving a constant can unlock further simplifications, so the scan
    /// restarts until a full pass changes nothing. Surviving rows are
    /// renumbered densely; eliminated unknowns are substituted into the
    /// right side. The reduced system is snapshotted for per-step
    /// restoration and subsequent stamps are remapped.
    pub fn simplify(&mut self) -> Result<()> {
        let n = self.full_size;

        // Fixpoint scan. Only a newly resolved constant forces a rescan;
        // equalities are discovered in document order.
        'scan: loop {
            for i in 0..n {
                {
                    let re = &self.row_info[i];
                    if re.lhs_changes || re.rhs_changes || re.dropped {
                        continue;
                    }
                }

                // running total of const values already removed from this row
                let mut rs_add = 0.0;
                let mut qp: Option<usize> = None;
                let mut qv = 0.0;
                let mut qm: Option<usize> = None;
                let mut too_many = false;
                for j in 0..n {
                    let q = self.matrix[i * n + j];
                    if self.row_info[j].kind == RowKind::Const {
                        rs_add -= self.row_info[j].const_value * q;
                        continue;
                    }
                    if q == 0.0 {
                        continue;
                    }
                    if qp.is_none() {
                        qp = Some(j);
                        qv = q;
                        continue;
                    }
                    if qm.is_none() && q == -qv {
                        qm = Some(j);
                        continue;
                    }
                    too_many = true;
                    break;
                }
                if too_many {
                    continue;
                }

                let Some(mut qp) = qp else {
                    // every unknown in this row is already resolved
                    return Err(SimError::MatrixError);
                };

                match qm {
                    None => {
                        // one nonzero entry: that unknown is a constant
                        let mut hops = 0;
                        while self.row_info[qp].kind == RowKind::Equal && hops < EQUAL_CHAIN_LIMIT
                        {
                            qp = self.row_info[qp].equal_target;
                            hops += 1;
                        }
                        if self.row_info[qp].kind == RowKind::Equal {
                            // cyclic chain: demote and move on
                            trace!("breaking equal chain at row {}", qp);
                            self.row_info[qp].kind = RowKind::Normal;
                            continue;
                        }
                        if self.row_info[qp].kind != RowKind::Normal {
                            trace!("row {} already resolved", qp);
                            continue;
                        }
                        self.row_info[qp].kind = RowKind::Const;
                        self.row_info[qp].const_value = (self.right_side[i] + rs_add) / qv;
                        self.row_info[i].dropped = true;
                        trace!(
                            "row {}: unknown {} = const {}",
                            i,
                            qp,
                            self.row_info[qp].const_value
                        );
                        continue 'scan;
                    }
                    Some(mut qm) if self.right_side[i] + rs_add == 0.0 => {
                        // two entries, one the negative of the other:
                        // the unknowns are equal
                        if self.row_info[qp].kind != RowKind::Normal {
                            std::mem::swap(&mut qp, &mut qm);
                            if self.row_info[qp].kind != RowKind::Normal {
                                // would need chain-following; hardly ever
                                // happens in practice
                                trace!("row {}: equal swap failed", i);
                                continue;
                            }
                        }
                        self.row_info[qp].kind = RowKind::Equal;
                        self.row_info[qp].equal_target = qm;
                        self.row_info[i].dropped = true;
                        trace!("row {}: unknown {} = unknown {}", i, qp, qm);
                    }
                    Some(_) => {}
                }
            }
            break;
        }

        // Assign dense columns to surviving unknowns and resolve EQUAL
        // chains to their ultimate target.
        let mut nn = 0;
        for i in 0..n {
            match self.row_info[i].kind {
                RowKind::Normal => {
                    self.row_info[i].mapped_col = Some(nn);
                    nn += 1;
                }
                RowKind::Equal => {
                    for _ in 0..EQUAL_CHAIN_LIMIT {
                        let t = self.row_info[i].equal_target;
                        if self.row_info[t].kind != RowKind::Equal
                            || self.row_info[t].equal_target == i
                        {
                            break;
                        }
                        self.row_info[i].equal_target = self.row_info[t].equal_target;
                    }
                }
                RowKind::Const => {
                    self.row_info[i].mapped_col = None;
                }
            }
        }
        for i in 0..n {
            if self.row_info[i].kind == RowKind::Equal {
                let t = self.row_info[i].equal_target;
                if self.row_info[t].kind == RowKind::Const {
                    // equal to a constant is a constant
                    self.row_info[i].kind = RowKind::Const;
                    self.row_info[i].const_value = self.row_info[t].const_value;
                    self.row_info[i].mapped_col = None;
                } else {
                    self.row_info[i].mapped_col = self.row_info[t].mapped_col;
                }
            }
        }

        // Row and column counts must agree or the system is inconsistent.
        let surviving = (0..n).filter(|&i| !self.row_info[i].dropped).count();
        if surviving != nn {
            return Err(SimError::MatrixError);
        }

        // Build the reduced system, substituting constants into the right
        // side and merging equal columns.
        let newsize = nn;
        let mut newmat = vec![0.0; newsize * newsize];
        let mut newrs = vec![0.0; newsize];
        let mut ii = 0;
        for i in 0..n {
            if self.row_info[i].dropped {
                self.row_info[i].mapped_row = None;
                continue;
            }
            newrs[ii] = self.right_side[i];
            self.row_info[i].mapped_row = Some(ii);
            for j in 0..n {
                let q = self.matrix[i * n + j];
                let rj = &self.row_info[j];
                if rj.kind == RowKind::Const {
                    newrs[ii] -= rj.const_value * q;
                } else if let Some(col) = rj.mapped_col {
                    newmat[ii * newsize + col] += q;
                }
            }
            ii += 1;
        }

        debug!("row simplification: {} rows -> {}", n, newsize);

        self.matrix = newmat;
        self.right_side = newrs;
        self.size = newsize;
        self.orig_matrix = self.matrix.clone();
        self.orig_right_side = self.right_side.clone();
        self.permute = vec![0; newsize];
        self.needs_map = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 system with one equality row, one constant row, and a 2x2
    /// surviving core:
    ///   x0 - x1            = 0   (x0 = x1)
    ///   2 x1 + x2          = 1
    ///   x1 + 2 x2 + x3     = 2
    ///   4 x3               = 8   (x3 = 2)
    fn sample_system() -> MnaSystem {
        let mut sys = MnaSystem::new(5, 0, 1e-5);
        sys.stamp_matrix(1, 1, 1.0);
        sys.stamp_matrix(1, 2, -1.0);
        sys.stamp_matrix(2, 2, 2.0);
        sys.stamp_matrix(2, 3, 1.0);
        sys.stamp_right_side(2, 1.0);
        sys.stamp_matrix(3, 2, 1.0);
        sys.stamp_matrix(3, 3, 2.0);
        sys.stamp_matrix(3, 4, 1.0);
        sys.stamp_right_side(3, 2.0);
        sys.stamp_matrix(4, 4, 4.0);
        sys.stamp_right_side(4, 8.0);
        sys
    }

    #[test]
    fn collapses_const_and_equal_rows() {
        let mut sys = sample_system();
        sys.simplify().unwrap();

        assert_eq!(sys.size(), 2);
        assert_eq!(sys.entry(0, 0), 2.0);
        assert_eq!(sys.entry(0, 1), 1.0);
        assert_eq!(sys.entry(1, 0), 1.0);
        assert_eq!(sys.entry(1, 1), 2.0);
        assert_eq!(sys.right_side_entry(0), 1.0);
        // x3 = 2 substituted: 2 - 2*1 = 0
        assert_eq!(sys.right_side_entry(1), 0.0);

        // x0 tracks x1's column; x3 resolved to a constant
        assert_eq!(sys.row_info[0].kind, RowKind::Equal);
        assert_eq!(sys.row_info[0].mapped_col, Some(0));
        assert_eq!(sys.row_info[3].kind, RowKind::Const);
        assert_eq!(sys.row_info[3].const_value, 2.0);
    }

    #[test]
    fn simplification_is_idempotent() {
        let mut sys = sample_system();
        sys.simplify().unwrap();

        // Re-run the pass over the reduced system: nothing further changes.
        let mut again = MnaSystem::new(3, 0, 1e-5);
        for r in 0..2 {
            for c in 0..2 {
                again.stamp_matrix(r + 1, c + 1, sys.entry(r, c));
            }
            again.stamp_right_side(r + 1, sys.right_side_entry(r));
        }
        again.simplify().unwrap();

        assert_eq!(again.size(), sys.size());
        for r in 0..2 {
            for c in 0..2 {
                assert_eq!(again.entry(r, c), sys.entry(r, c));
            }
            assert_eq!(again.right_side_entry(r), sys.right_side_entry(r));
        }
    }

    #[test]
    fn all_zero_row_is_a_matrix_error() {
        let mut sys = MnaSystem::new(2, 0, 1e-5);
        assert_eq!(sys.simplify(), Err(SimError::MatrixError));
    }

    #[test]
    fn changing_rows_are_left_alone() {
        // A single-entry row flagged as changing every step must survive.
        let mut sys = MnaSystem::new(3, 0, 1e-5);
        sys.stamp_matrix(1, 1, 1.0);
        sys.mark_right_side_changes(1);
        sys.stamp_matrix(2, 1, -1.0);
        sys.stamp_matrix(2, 2, 1.0);
        sys.stamp_matrix(2, 1, 0.5);
        sys.simplify().unwrap();

        assert_eq!(sys.size(), 2);
        assert_eq!(sys.row_info[0].kind, RowKind::Normal);
    }
}
