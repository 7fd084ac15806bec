//! Damped Newton corrector for the continuation method.
//!
//! Refines the predictor's extrapolation back onto the solution manifold
//! by solving the augmented system `[F(x, λ); P(x, λ)] = 0` with a full
//! Newton method. Each Newton step is damped by a factor `μ` that starts
//! at `mu0` and shrinks geometrically while the residual fails to improve
//! (backtracking line search). The whole corrector gives up when even the
//! smallest damping cannot improve the residual once.
//!
//! The iteration state lives in an immutable [`Iterate`] snapshot; a
//! backtracking trial builds a candidate from the snapshot instead of
//! patching arrays in place, so a rejected trial needs no undo logic.

use num_complex::Complex64;
use sprs::CsMat;

use vstab_compile::BusPartition;

use crate::jacobian::{build_augmented_jacobian, transfer_column};
use crate::linsolve;
use crate::sparse::{compute_power, inf_norm, polar_to_rect};

use super::parametrization::Parametrization;
use super::{CpfError, Stage};

/// Corrector tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct CorrectorSettings {
    /// Convergence tolerance on the augmented residual infinity-norm
    pub tol: f64,
    /// Maximum Newton iterations
    pub max_it: usize,
    /// Initial damping factor (1.0 = plain Newton on the first trial)
    pub mu0: f64,
    /// Geometric damping shrink factor per rejected trial
    pub acceleration: f64,
}

/// Corrector result at one continuation step.
#[derive(Debug, Clone)]
pub struct CorrectorOutput {
    /// Corrected complex voltages
    pub v: Vec<Complex64>,
    /// Corrected loading parameter
    pub lam: f64,
    /// Whether the augmented residual met the tolerance
    pub converged: bool,
    /// Newton iterations spent
    pub iterations: usize,
    /// Final residual infinity-norm
    pub norm_f: f64,
    /// Calculated injections at the final point
    pub scalc: Vec<Complex64>,
}

/// One immutable Newton iterate.
#[derive(Clone)]
struct Iterate {
    va: Vec<f64>,
    vm: Vec<f64>,
    lam: f64,
}

impl Iterate {
    fn from_voltages(v: &[Complex64], lam: f64) -> Self {
        Self {
            va: v.iter().map(|c| c.arg()).collect(),
            vm: v.iter().map(|c| c.norm()).collect(),
            lam,
        }
    }

    fn voltages(&self) -> Vec<Complex64> {
        polar_to_rect(&self.vm, &self.va)
    }

    /// Apply a damped Newton step: `x ← x - μ·dx`.
    fn stepped(&self, dx: &[f64], part: &BusPartition, mu: f64) -> Self {
        let mut next = self.clone();
        for (col, &bus) in part.pvpq.iter().enumerate() {
            next.va[bus] -= mu * dx[col];
        }
        let npvpq = part.pvpq.len();
        for (k, &bus) in part.pq.iter().enumerate() {
            next.vm[bus] -= mu * dx[npvpq + k];
        }
        next.lam -= mu * dx[part.nj()];
        next
    }
}

/// Augmented residual `[ΔP(pvpq), ΔQ(pq), P]` and the injections behind it.
#[allow(clippy::too_many_arguments)]
fn residual(
    ybus: &CsMat<Complex64>,
    sbus: &[Complex64],
    sxfr: &[Complex64],
    v: &[Complex64],
    lam: f64,
    step: f64,
    z: &[f64],
    v_prev: &[Complex64],
    lam_prev: f64,
    param: &dyn Parametrization,
    part: &BusPartition,
) -> (Vec<f64>, Vec<Complex64>) {
    let scalc = compute_power(ybus, v);
    let mut f = Vec::with_capacity(part.nj() + 1);
    for &bus in &part.pvpq {
        f.push(scalc[bus].re - sbus[bus].re - lam * sxfr[bus].re);
    }
    for &bus in &part.pq {
        f.push(scalc[bus].im - sbus[bus].im - lam * sxfr[bus].im);
    }
    f.push(param.evaluate(step, z, v, lam, v_prev, lam_prev, part));
    (f, scalc)
}

/// Correct the predicted point `(v0, λ0)` onto the solution manifold.
#[allow(clippy::too_many_arguments)]
pub fn correct(
    ybus: &CsMat<Complex64>,
    sbus: &[Complex64],
    v0: &[Complex64],
    lam0: f64,
    sxfr: &[Complex64],
    v_prev: &[Complex64],
    lam_prev: f64,
    z: &[f64],
    step: f64,
    param: &dyn Parametrization,
    part: &BusPartition,
    settings: &CorrectorSettings,
) -> Result<CorrectorOutput, CpfError> {
    let mut iterate = Iterate::from_voltages(v0, lam0);
    let mut v = iterate.voltages();

    let (mut f, mut scalc) = residual(
        ybus, sbus, sxfr, &v, iterate.lam, step, z, v_prev, lam_prev, param, part,
    );
    let mut norm_f = inf_norm(&f);
    if norm_f < settings.tol {
        return Ok(CorrectorOutput {
            v,
            lam: iterate.lam,
            converged: true,
            iterations: 0,
            norm_f,
            scalc,
        });
    }

    let df_dlam = transfer_column(sxfr, part);

    for iteration in 1..=settings.max_it {
        let (dp_dx, dp_dlam) = param.partials(z, &v, iterate.lam, v_prev, lam_prev, part);
        let j2 = build_augmented_jacobian(ybus, &v, part, &df_dlam, &dp_dx, dp_dlam);
        let dx = linsolve::solve(&j2, &f).map_err(|_| CpfError::SingularJacobian {
            stage: Stage::Corrector,
        })?;

        // Backtracking over the immutable pre-step snapshot
        let mut mu = settings.mu0;
        let mut accepted = None;
        let mut trials = 0;
        while trials < settings.max_it && mu > settings.tol {
            let candidate = iterate.stepped(&dx, part, mu);
            let v_cand = candidate.voltages();
            let (f_cand, scalc_cand) = residual(
                ybus, sbus, sxfr, &v_cand, candidate.lam, step, z, v_prev, lam_prev, param,
                part,
            );
            let norm_cand = inf_norm(&f_cand);
            trials += 1;
            if norm_cand <= norm_f {
                accepted = Some((candidate, v_cand, f_cand, scalc_cand, norm_cand));
                break;
            }
            mu *= settings.acceleration;
        }

        match accepted {
            Some((next, v_next, f_next, scalc_next, norm_next)) => {
                iterate = next;
                v = v_next;
                f = f_next;
                scalc = scalc_next;
                norm_f = norm_next;
            }
            None => {
                // Backtracking could not improve the residual at all:
                // abort with the pre-step point intact.
                return Ok(CorrectorOutput {
                    v,
                    lam: iterate.lam,
                    converged: false,
                    iterations: iteration,
                    norm_f,
                    scalc,
                });
            }
        }

        if norm_f < settings.tol {
            return Ok(CorrectorOutput {
                v,
                lam: iterate.lam,
                converged: true,
                iterations: iteration,
                norm_f,
                scalc,
            });
        }
    }

    Ok(CorrectorOutput {
        v,
        lam: iterate.lam,
        converged: false,
        iterations: settings.max_it,
        norm_f,
        scalc,
    })
}
