//! Sparse power-flow Jacobian in polar coordinates.
//!
//! The unknown vector is `[θ at PV∪PQ buses, |V| at PQ buses]` and the
//! equation rows are the active-power mismatches at PV∪PQ buses followed
//! by the reactive-power mismatches at PQ buses:
//!
//! ```text
//! J = [ ∂P/∂θ   ∂P/∂V ]      size nj×nj,  nj = npv + 2·npq
//!     [ ∂Q/∂θ   ∂Q/∂V ]
//! ```
//!
//! Sparsity follows the network topology: bus `i`'s row touches only the
//! buses adjacent to `i` in the admittance matrix. The continuation method
//! borders the same matrix with one extra column `∂F/∂λ` and one extra row
//! `[∂P/∂x, ∂P/∂λ]` from the parametrization constraint.

use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use vstab_compile::BusPartition;

use crate::sparse::row_iter;

/// Fill `tri` with the nj×nj power-flow block at voltage `v`.
fn fill_power_flow_block(
    tri: &mut TriMat<f64>,
    ybus: &CsMat<Complex64>,
    v: &[Complex64],
    part: &BusPartition,
) {
    let n = v.len();
    let va: Vec<f64> = v.iter().map(|c| c.arg()).collect();
    let vm: Vec<f64> = v.iter().map(|c| c.norm()).collect();

    for i in 0..n {
        // Row indices: P rows share the θ-column layout, Q rows the |V| one
        let p_row = part.theta_col(i);
        let q_row = part.vm_col(i);
        if p_row.is_none() && q_row.is_none() {
            continue;
        }

        // Injections at bus i, needed by the diagonal terms
        let mut p_i = 0.0;
        let mut q_i = 0.0;
        for (j, y) in row_iter(ybus, i) {
            let theta_ij = va[i] - va[j];
            let (sin_t, cos_t) = theta_ij.sin_cos();
            p_i += vm[i] * vm[j] * (y.re * cos_t + y.im * sin_t);
            q_i += vm[i] * vm[j] * (y.re * sin_t - y.im * cos_t);
        }

        for (j, y) in row_iter(ybus, i) {
            let (g, b) = (y.re, y.im);
            let theta_ij = va[i] - va[j];
            let (sin_t, cos_t) = theta_ij.sin_cos();

            if let Some(row) = p_row {
                if let Some(col) = part.theta_col(j) {
                    let val = if i == j {
                        -q_i - b * vm[i] * vm[i]
                    } else {
                        vm[i] * vm[j] * (g * sin_t - b * cos_t)
                    };
                    tri.add_triplet(row, col, val);
                }
                if let Some(col) = part.vm_col(j) {
                    let val = if i == j {
                        p_i / vm[i] + g * vm[i]
                    } else {
                        vm[i] * (g * cos_t + b * sin_t)
                    };
                    tri.add_triplet(row, col, val);
                }
            }

            if let Some(row) = q_row {
                if let Some(col) = part.theta_col(j) {
                    let val = if i == j {
                        p_i - g * vm[i] * vm[i]
                    } else {
                        -vm[i] * vm[j] * (g * cos_t + b * sin_t)
                    };
                    tri.add_triplet(row, col, val);
                }
                if let Some(col) = part.vm_col(j) {
                    let val = if i == j {
                        q_i / vm[i] - b * vm[i]
                    } else {
                        vm[i] * (g * sin_t - b * cos_t)
                    };
                    tri.add_triplet(row, col, val);
                }
            }
        }
    }
}

/// Build the nj×nj power-flow Jacobian.
pub fn build_jacobian(
    ybus: &CsMat<Complex64>,
    v: &[Complex64],
    part: &BusPartition,
) -> CsMat<f64> {
    let nj = part.nj();
    let mut tri = TriMat::new((nj, nj));
    fill_power_flow_block(&mut tri, ybus, v, part);
    tri.to_csr()
}

/// Build the bordered (nj+1)×(nj+1) continuation Jacobian:
///
/// ```text
/// J2 = [   J      ∂F/∂λ ]
///      [ ∂P/∂x   ∂P/∂λ ]
/// ```
pub fn build_augmented_jacobian(
    ybus: &CsMat<Complex64>,
    v: &[Complex64],
    part: &BusPartition,
    df_dlam: &[f64],
    dp_dx: &[f64],
    dp_dlam: f64,
) -> CsMat<f64> {
    let nj = part.nj();
    debug_assert_eq!(df_dlam.len(), nj);
    debug_assert_eq!(dp_dx.len(), nj);

    let mut tri = TriMat::new((nj + 1, nj + 1));
    fill_power_flow_block(&mut tri, ybus, v, part);
    for (r, &val) in df_dlam.iter().enumerate() {
        if val != 0.0 {
            tri.add_triplet(r, nj, val);
        }
    }
    for (c, &val) in dp_dx.iter().enumerate() {
        if val != 0.0 {
            tri.add_triplet(nj, c, val);
        }
    }
    tri.add_triplet(nj, nj, dp_dlam);
    tri.to_csr()
}

/// The `∂F/∂λ` border column: minus the transfer direction, gathered over
/// the mismatch row ordering.
pub fn transfer_column(sxfr: &[Complex64], part: &BusPartition) -> Vec<f64> {
    let mut col = Vec::with_capacity(part.nj());
    for &bus in &part.pvpq {
        col.push(-sxfr[bus].re);
    }
    for &bus in &part.pq {
        col.push(-sxfr[bus].im);
    }
    col
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::compute_power;
    use sprs::TriMat;
    use vstab_compile::{BusKind, BusPartition};

    fn ybus_2bus() -> CsMat<Complex64> {
        let y = Complex64::new(0.01, 0.1).inv();
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, y);
        tri.add_triplet(1, 1, y);
        tri.add_triplet(0, 1, -y);
        tri.add_triplet(1, 0, -y);
        tri.to_csr()
    }

    fn part_2bus() -> BusPartition {
        BusPartition::from_types(&[BusKind::Slack, BusKind::Pq])
    }

    /// Finite-difference check of every Jacobian entry on the 2-bus system.
    #[test]
    fn jacobian_matches_finite_differences() {
        let ybus = ybus_2bus();
        let part = part_2bus();
        let v = vec![
            Complex64::new(1.0, 0.0),
            Complex64::from_polar(0.97, -0.04),
        ];
        let jac = build_jacobian(&ybus, &v, &part);

        let h = 1e-7;
        let f = |v: &[Complex64]| -> Vec<f64> {
            let s = compute_power(&ybus, v);
            vec![s[1].re, s[1].im]
        };

        let base = f(&v);

        // Column 0: θ at bus 1
        let mut v_t = v.clone();
        v_t[1] = Complex64::from_polar(v[1].norm(), v[1].arg() + h);
        let pert_t = f(&v_t);
        // Column 1: |V| at bus 1
        let mut v_m = v.clone();
        v_m[1] = Complex64::from_polar(v[1].norm() + h, v[1].arg());
        let pert_m = f(&v_m);

        let expected = [
            [(pert_t[0] - base[0]) / h, (pert_m[0] - base[0]) / h],
            [(pert_t[1] - base[1]) / h, (pert_m[1] - base[1]) / h],
        ];
        for r in 0..2 {
            for c in 0..2 {
                let got = jac.get(r, c).copied().unwrap_or(0.0);
                assert!(
                    (got - expected[r][c]).abs() < 1e-5,
                    "J[{},{}] = {} vs fd {}",
                    r,
                    c,
                    got,
                    expected[r][c]
                );
            }
        }
    }

    #[test]
    fn augmented_border_is_placed() {
        let ybus = ybus_2bus();
        let part = part_2bus();
        let v = vec![Complex64::new(1.0, 0.0), Complex64::new(0.98, -0.02)];
        let sxfr = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-0.5, -0.2),
        ];
        let df_dlam = transfer_column(&sxfr, &part);
        assert_eq!(df_dlam, vec![0.5, 0.2]);

        let j2 = build_augmented_jacobian(&ybus, &v, &part, &df_dlam, &[0.0, 0.0], 1.0);
        assert_eq!(j2.rows(), 3);
        assert_eq!(j2.get(0, 2).copied().unwrap_or(0.0), 0.5);
        assert_eq!(j2.get(1, 2).copied().unwrap_or(0.0), 0.2);
        assert_eq!(j2.get(2, 2).copied().unwrap_or(0.0), 1.0);
    }
}
