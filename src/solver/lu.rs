//! Dense LU factorization and triangular solve.
//!
//! Crout's method with implicit row scaling and partial pivoting, operating
//! in place on a row-major matrix. A linear circuit factors once per
//! topology change and reuses the factors for every timestep's right side.

use log::warn;

/// Factor `a` (row-major, `n` x `n`) into upper and lower triangular
/// matrices in place. `ipvt` receives the pivot permutation used by
/// [`lu_solve`]. Returns `false` when a row is entirely zero (singular
/// matrix). A zero pivot is nudged to `pivot_floor` instead of failing, to
/// tolerate marginal topologies.
pub fn lu_factor(a: &mut [f64], n: usize, ipvt: &mut [usize], pivot_floor: f64) -> bool {
    // normalize each row by its largest entry for pivot comparison
    let mut scale = vec![0.0; n];
    for i in 0..n {
        let mut largest = 0.0f64;
        for j in 0..n {
            let x = a[i * n + j].abs();
            if x > largest {
                largest = x;
            }
        }
        if largest == 0.0 {
            return false;
        }
        scale[i] = 1.0 / largest;
    }

    // Crout's method; loop through the columns
    for j in 0..n {
        // upper triangular elements for this column
        for i in 0..j {
            let mut q = a[i * n + j];
            for k in 0..i {
                q -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = q;
        }

        // lower triangular candidates; the largest scaled one is the pivot
        let mut largest = 0.0f64;
        let mut largest_row = j;
        for i in j..n {
            let mut q = a[i * n + j];
            for k in 0..j {
                q -= a[i * n + k] * a[k * n + j];
            }
            a[i * n + j] = q;
            let x = scale[i] * q.abs();
            if x >= largest {
                largest = x;
                largest_row = i;
            }
        }

        if j != largest_row {
            for k in 0..n {
                a.swap(largest_row * n + k, j * n + k);
            }
            scale[largest_row] = scale[j];
        }
        ipvt[j] = largest_row;

        if a[j * n + j] == 0.0 {
            warn!("nudging zero pivot in column {}", j);
            a[j * n + j] = pivot_floor;
        }

        if j != n - 1 {
            let mult = 1.0 / a[j * n + j];
            for i in (j + 1)..n {
                a[i * n + j] *= mult;
            }
        }
    }
    true
}

/// Solve the factored system for right side `b` in place. May be called
/// repeatedly against one factorization for different right sides.
pub fn lu_solve(a: &[f64], n: usize, ipvt: &[usize], b: &mut [f64]) {
    // apply the permutation, skipping leading zero entries
    let mut i = 0;
    while i < n {
        let row = ipvt[i];
        let swap = b[row];
        b[row] = b[i];
        b[i] = swap;
        if swap != 0.0 {
            break;
        }
        i += 1;
    }

    let bi = i;
    i += 1;
    // forward substitution using the lower triangular matrix
    while i < n {
        let row = ipvt[i];
        let mut tot = b[row];
        b[row] = b[i];
        for j in bi..i {
            tot -= a[i * n + j] * b[j];
        }
        b[i] = tot;
        i += 1;
    }

    // back substitution using the upper triangular matrix
    for i in (0..n).rev() {
        let mut tot = b[i];
        for j in (i + 1)..n {
            tot -= a[i * n + j] * b[j];
        }
        b[i] = tot / a[i * n + i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn residual(a: &[f64], n: usize, x: &[f64], b: &[f64]) -> f64 {
        let mut worst = 0.0f64;
        for i in 0..n {
            let mut sum = 0.0;
            for j in 0..n {
                sum += a[i * n + j] * x[j];
            }
            worst = worst.max((sum - b[i]).abs());
        }
        worst
    }

    #[test]
    fn factor_solve_round_trip() {
        let a = vec![4.0, 3.0, 0.0, 6.0, 3.0, 1.0, 0.0, 2.0, 5.0];
        let b = vec![10.0, 17.0, 14.0];

        let mut lu = a.clone();
        let mut ipvt = vec![0usize; 3];
        assert!(lu_factor(&mut lu, 3, &mut ipvt, 1e-18));

        let mut x = b.clone();
        lu_solve(&lu, 3, &ipvt, &mut x);
        assert!(residual(&a, 3, &x, &b) < 1e-12);
    }

    #[test]
    fn solve_reuses_one_factorization() {
        let a = vec![5.0, 1.0, 2.0, -1.0, 7.0, 0.5, 0.25, -2.0, 6.0];
        let mut lu = a.clone();
        let mut ipvt = vec![0usize; 3];
        assert!(lu_factor(&mut lu, 3, &mut ipvt, 1e-18));

        for rhs in [[1.0, 0.0, 0.0], [0.0, -3.0, 9.0], [2.5, 2.5, 2.5]] {
            let mut x = rhs.to_vec();
            lu_solve(&lu, 3, &ipvt, &mut x);
            assert!(residual(&a, 3, &x, &rhs) < 1e-12);
        }
    }

    #[test]
    fn larger_diagonally_dominant_system() {
        let n = 5;
        let mut a = vec![0.0; n * n];
        let mut b = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                a[i * n + j] = if i == j {
                    10.0 + i as f64
                } else {
                    ((i * 7 + j * 3) % 5) as f64 - 2.0
                };
            }
            b[i] = (i as f64) - 1.5;
        }

        let mut lu = a.clone();
        let mut ipvt = vec![0usize; n];
        assert!(lu_factor(&mut lu, n, &mut ipvt, 1e-18));

        let mut x = b.clone();
        lu_solve(&lu, n, &ipvt, &mut x);
        assert!(residual(&a, n, &x, &b) < 1e-9);
    }

    #[test]
    fn all_zero_row_is_singular() {
        let mut a = vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 3.0, 1.0, 4.0];
        let mut ipvt = vec![0usize; 3];
        assert!(!lu_factor(&mut a, 3, &mut ipvt, 1e-18));
    }
}
