//! Linear solve for the Newton and predictor systems.
//!
//! Systems are assembled sparsely (triplets → CSR) and factorized with
//! faer's partial-pivot LU. A singular system shows up as non-finite
//! entries in the solution and is surfaced as a typed error — never as a
//! NaN leaking into the iteration state.

use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use sprs::CsMat;
use thiserror::Error;

use crate::sparse::row_iter;

/// The coefficient matrix was singular to working precision.
#[derive(Debug, Error)]
#[error("singular coefficient matrix")]
pub struct SingularMatrix;

/// Solve `A·x = b` for a sparse square `A`.
pub fn solve(a: &CsMat<f64>, b: &[f64]) -> Result<Vec<f64>, SingularMatrix> {
    let n = b.len();
    if n == 0 {
        return Ok(vec![]);
    }
    debug_assert_eq!(a.rows(), n);
    debug_assert_eq!(a.cols(), n);

    let mut mat = Mat::zeros(n, n);
    for i in 0..n {
        for (j, v) in row_iter(a, i) {
            mat.write(i, j, *v);
        }
    }

    let mut rhs = Mat::zeros(n, 1);
    for (i, v) in b.iter().enumerate() {
        rhs.write(i, 0, *v);
    }

    let lu = mat.partial_piv_lu();
    let solution = lu.solve(&rhs);
    let x: Vec<f64> = (0..n).map(|i| solution.read(i, 0)).collect();

    if x.iter().any(|v| !v.is_finite()) {
        return Err(SingularMatrix);
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn csr_from(entries: &[(usize, usize, f64)], n: usize) -> CsMat<f64> {
        let mut tri = TriMat::new((n, n));
        for &(i, j, v) in entries {
            tri.add_triplet(i, j, v);
        }
        tri.to_csr()
    }

    #[test]
    fn solves_tridiagonal() {
        let a = csr_from(
            &[
                (0, 0, 4.0),
                (0, 1, 1.0),
                (1, 0, 1.0),
                (1, 1, 4.0),
                (1, 2, 1.0),
                (2, 1, 1.0),
                (2, 2, 4.0),
            ],
            3,
        );
        let b = [1.0, 2.0, 1.0];
        let x = solve(&a, &b).unwrap();
        // Verify A·x = b
        for i in 0..3 {
            let mut acc = 0.0;
            for (j, v) in row_iter(&a, i) {
                acc += v * x[j];
            }
            assert!((acc - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn singular_is_an_error_not_nan() {
        // Second row identically zero
        let a = csr_from(&[(0, 0, 1.0), (0, 1, 2.0)], 2);
        let b = [1.0, 1.0];
        assert!(solve(&a, &b).is_err());
    }

    #[test]
    fn empty_system() {
        let a = csr_from(&[], 0);
        assert!(solve(&a, &[]).unwrap().is_empty());
    }
}
