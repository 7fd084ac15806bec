//! Tangent predictor for the continuation method.
//!
//! Solves the bordered system `J2·z = e_{nj+1}` for the tangent direction,
//! normalizes it, and extrapolates a first guess for the next solution.
//! The normalization also acts as the numerical early warning for the
//! nose: as the power-flow Jacobian approaches singularity the raw tangent
//! blows up, and after normalization its λ component shrinks toward zero.

use num_complex::Complex64;
use sprs::CsMat;

use vstab_compile::BusPartition;

use crate::jacobian::{build_augmented_jacobian, transfer_column};
use crate::linsolve;
use crate::sparse::{norm2, polar_to_rect};

use super::parametrization::Parametrization;
use super::{CpfError, Stage};

/// Predictor output: the extrapolated point and the normalized tangent.
#[derive(Debug, Clone)]
pub struct PredictorOutput {
    /// Predicted complex voltages
    pub v0: Vec<Complex64>,
    /// Predicted loading parameter
    pub lam0: f64,
    /// Normalized tangent, layout `[dθ(0..n), d|V|(n..2n), dλ(2n)]`
    pub z: Vec<f64>,
}

/// Compute the normalized tangent at `(v, λ)` and extrapolate by `step`.
#[allow(clippy::too_many_arguments)]
pub fn predict(
    v: &[Complex64],
    lam: f64,
    ybus: &CsMat<Complex64>,
    sxfr: &[Complex64],
    part: &BusPartition,
    step: f64,
    z_prev: &[f64],
    v_prev: &[Complex64],
    lam_prev: f64,
    param: &dyn Parametrization,
) -> Result<PredictorOutput, CpfError> {
    let n = v.len();
    let nj = part.nj();

    let df_dlam = transfer_column(sxfr, part);
    let (dp_dx, dp_dlam) = param.partials(z_prev, v, lam, v_prev, lam_prev, part);
    let j2 = build_augmented_jacobian(ybus, v, part, &df_dlam, &dp_dx, dp_dlam);

    // Right-hand side e_{nj+1}: grow in the direction of λ
    let mut rhs = vec![0.0; nj + 1];
    rhs[nj] = 1.0;

    let z_reduced = linsolve::solve(&j2, &rhs).map_err(|_| CpfError::SingularJacobian {
        stage: Stage::Predictor,
    })?;

    // Scatter into the full tangent and normalize by the Euclidean norm
    let mut z = vec![0.0; 2 * n + 1];
    for (col, &bus) in part.pvpq.iter().enumerate() {
        z[bus] = z_reduced[col];
    }
    let npvpq = part.pvpq.len();
    for (k, &bus) in part.pq.iter().enumerate() {
        z[n + bus] = z_reduced[npvpq + k];
    }
    z[2 * n] = z_reduced[nj];

    let norm = norm2(&z);
    if !norm.is_finite() || norm == 0.0 {
        return Err(CpfError::SingularJacobian {
            stage: Stage::Predictor,
        });
    }
    for entry in z.iter_mut() {
        *entry /= norm;
    }

    // Extrapolate along the tangent
    let mut va: Vec<f64> = v.iter().map(|c| c.arg()).collect();
    let mut vm: Vec<f64> = v.iter().map(|c| c.norm()).collect();
    for &bus in &part.pvpq {
        va[bus] += step * z[bus];
    }
    for &bus in &part.pq {
        vm[bus] += step * z[n + bus];
    }
    let lam0 = lam + step * z[2 * n];

    Ok(PredictorOutput {
        v0: polar_to_rect(&vm, &va),
        lam0,
        z,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::parametrization::{ArcLength, Natural};
    use crate::sparse::norm2;
    use sprs::TriMat;
    use vstab_compile::BusKind;

    fn ybus_2bus() -> CsMat<Complex64> {
        let y = Complex64::new(0.01, 0.1).inv();
        let mut tri = TriMat::new((2, 2));
        tri.add_triplet(0, 0, y);
        tri.add_triplet(1, 1, y);
        tri.add_triplet(0, 1, -y);
        tri.add_triplet(1, 0, -y);
        tri.to_csr()
    }

    #[test]
    fn tangent_is_normalized() {
        let ybus = ybus_2bus();
        let part = BusPartition::from_types(&[BusKind::Slack, BusKind::Pq]);
        let v = vec![Complex64::new(1.0, 0.0); 2];
        let sxfr = vec![Complex64::new(0.0, 0.0), Complex64::new(-0.5, -0.2)];
        let mut z0 = vec![0.0; 5];
        z0[4] = 1.0;

        let out = predict(&v, 0.0, &ybus, &sxfr, &part, 0.01, &z0, &v, 0.0, &Natural).unwrap();
        assert!((norm2(&out.z) - 1.0).abs() < 1e-12);
        // Loading the PQ bus: the tangent must move λ forward and drop |V|
        assert!(out.z[4] > 0.0);
        assert!(out.z[3] < 0.0);
        assert!(out.lam0 > 0.0);
    }

    #[test]
    fn arc_length_first_step_is_well_posed() {
        let ybus = ybus_2bus();
        let part = BusPartition::from_types(&[BusKind::Slack, BusKind::Pq]);
        let v = vec![Complex64::new(1.0, 0.0); 2];
        let sxfr = vec![Complex64::new(0.0, 0.0), Complex64::new(-0.5, -0.2)];
        let mut z0 = vec![0.0; 5];
        z0[4] = 1.0;

        // λ == λ_prev: without the ∂P/∂λ guard this system would be singular
        let out =
            predict(&v, 0.0, &ybus, &sxfr, &part, 0.01, &z0, &v, 0.0, &ArcLength).unwrap();
        assert!((norm2(&out.z) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn isolated_bus_raises_singular_jacobian() {
        // Bus 2 is electrically isolated: its Jacobian rows are empty
        let y = Complex64::new(0.01, 0.1).inv();
        let mut tri = TriMat::new((3, 3));
        tri.add_triplet(0, 0, y);
        tri.add_triplet(1, 1, y);
        tri.add_triplet(0, 1, -y);
        tri.add_triplet(1, 0, -y);
        let ybus: CsMat<Complex64> = tri.to_csr();

        let part = BusPartition::from_types(&[BusKind::Slack, BusKind::Pq, BusKind::Pq]);
        let v = vec![Complex64::new(1.0, 0.0); 3];
        let sxfr = vec![
            Complex64::new(0.0, 0.0),
            Complex64::new(-0.3, -0.1),
            Complex64::new(0.0, 0.0),
        ];
        let mut z0 = vec![0.0; 7];
        z0[6] = 1.0;

        let err = predict(&v, 0.0, &ybus, &sxfr, &part, 0.01, &z0, &v, 0.0, &Natural)
            .unwrap_err();
        assert!(matches!(
            err,
            CpfError::SingularJacobian {
                stage: Stage::Predictor
            }
        ));
    }
}
