//! Zero-allocation helpers over CSR matrices and polar voltage vectors.
//!
//! Directly accesses CSR index arrays to avoid temporary sparse-vector
//! views in the hot loops shared by the Newton and continuation solvers.

use num_complex::Complex64;
use sprs::CsMat;

/// Iterate over the non-zero entries `(col, value)` of row `i`.
pub fn row_iter<N>(m: &CsMat<N>, i: usize) -> impl Iterator<Item = (usize, &N)> + '_ {
    let indptr = m.indptr();
    let start = indptr.index(i);
    let end = indptr.index(i + 1);
    let indices = &m.indices()[start..end];
    let data = &m.data()[start..end];
    indices.iter().zip(data.iter()).map(|(&j, v)| (j, v))
}

/// Sparse matrix × dense complex vector.
pub fn mul_vec(m: &CsMat<Complex64>, v: &[Complex64]) -> Vec<Complex64> {
    debug_assert_eq!(m.cols(), v.len());
    (0..m.rows())
        .map(|i| {
            let mut acc = Complex64::new(0.0, 0.0);
            for (j, y) in row_iter(m, i) {
                acc += *y * v[j];
            }
            acc
        })
        .collect()
}

/// Real sparse matrix × dense complex vector (connectivity gathers).
pub fn mul_vec_real(m: &CsMat<f64>, v: &[Complex64]) -> Vec<Complex64> {
    debug_assert_eq!(m.cols(), v.len());
    (0..m.rows())
        .map(|i| {
            let mut acc = Complex64::new(0.0, 0.0);
            for (j, c) in row_iter(m, i) {
                acc += *c * v[j];
            }
            acc
        })
        .collect()
}

/// Calculated complex power injections: `S = V ⊙ conj(Ybus·V)`.
pub fn compute_power(ybus: &CsMat<Complex64>, v: &[Complex64]) -> Vec<Complex64> {
    mul_vec(ybus, v)
        .into_iter()
        .zip(v)
        .map(|(i_inj, vi)| vi * i_inj.conj())
        .collect()
}

/// Rebuild rectangular voltages from magnitude and angle arrays.
pub fn polar_to_rect(vm: &[f64], va: &[f64]) -> Vec<Complex64> {
    vm.iter()
        .zip(va)
        .map(|(&m, &a)| Complex64::from_polar(m, a))
        .collect()
}

/// Infinity norm of a real vector.
pub fn inf_norm(x: &[f64]) -> f64 {
    x.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
}

/// Euclidean norm of a real vector.
pub fn norm2(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn small_ybus() -> CsMat<Complex64> {
        // 2-bus line r=0.01, x=0.1
        let y = Complex64::new(0.01, 0.1).inv();
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, y);
        tri.add_triplet(1, 1, y);
        tri.add_triplet(0, 1, -y);
        tri.add_triplet(1, 0, -y);
        tri.to_csr()
    }

    #[test]
    fn power_is_zero_at_flat_voltage() {
        let ybus = small_ybus();
        let v = vec![Complex64::new(1.0, 0.0); 2];
        let s = compute_power(&ybus, &v);
        assert!(s[0].norm() < 1e-12);
        assert!(s[1].norm() < 1e-12);
    }

    #[test]
    fn power_balances_with_losses() {
        let ybus = small_ybus();
        let v = vec![
            Complex64::new(1.0, 0.0),
            Complex64::from_polar(0.98, -0.03),
        ];
        let s = compute_power(&ybus, &v);
        // Sending end must supply the receiving end plus positive losses
        let loss = s[0] + s[1];
        assert!(loss.re > 0.0);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let ybus = small_ybus();
        let v = vec![
            Complex64::new(1.0, 0.0),
            Complex64::from_polar(0.95, -0.05),
        ];
        let s1 = compute_power(&ybus, &v);
        let s2 = compute_power(&ybus, &v);
        for (a, b) in s1.iter().zip(&s2) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn norms() {
        assert!((inf_norm(&[1.0, -3.0, 2.0]) - 3.0).abs() < 1e-15);
        assert!((norm2(&[3.0, 4.0]) - 5.0).abs() < 1e-15);
    }
}
