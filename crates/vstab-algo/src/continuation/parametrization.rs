//! Continuation parametrization constraints.
//!
//! The power-flow equations alone leave the continuation system one
//! equation short: `nj` mismatches against `nj + 1` unknowns `(x, λ)`.
//! The parametrization function `P(x, λ)` closes it. Three schemes are
//! supported, each a separate implementation selected once at run start —
//! there is no per-call tag dispatch and no fallback for unknown tags:
//!
//! - **Natural**: `P = ±(λ - λ_prev) - step`. Steps λ directly; the sign
//!   flips once λ starts decreasing so the lower branch can be traced.
//! - **ArcLength**: `P = ‖Δstate‖² - step²`. Steps a fixed distance along
//!   the curve, which stays well-posed at the nose where λ stalls.
//! - **PseudoArcLength**: `P = z·Δstate - step`. Steps a fixed distance
//!   along the previous tangent; linear in the state, cheapest partials.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use vstab_compile::BusPartition;

use super::CpfError;

/// Selector for the parametrization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParametrizationKind {
    Natural,
    ArcLength,
    PseudoArcLength,
}

impl ParametrizationKind {
    /// Instantiate the scheme. Called once per run by the driver.
    pub fn instantiate(self) -> Box<dyn Parametrization> {
        match self {
            ParametrizationKind::Natural => Box::new(Natural),
            ParametrizationKind::ArcLength => Box::new(ArcLength),
            ParametrizationKind::PseudoArcLength => Box::new(PseudoArcLength),
        }
    }
}

impl FromStr for ParametrizationKind {
    type Err = CpfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "natural" => Ok(ParametrizationKind::Natural),
            "arc-length" => Ok(ParametrizationKind::ArcLength),
            "pseudo-arc-length" => Ok(ParametrizationKind::PseudoArcLength),
            other => Err(CpfError::InvalidOptions(format!(
                "unknown parametrization '{}' (expected natural, arc-length or pseudo-arc-length)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ParametrizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParametrizationKind::Natural => "natural",
            ParametrizationKind::ArcLength => "arc-length",
            ParametrizationKind::PseudoArcLength => "pseudo-arc-length",
        };
        f.write_str(name)
    }
}

/// One continuation parametrization scheme.
///
/// The tangent `z` has the full layout `[dθ(0..n), d|V|(n..2n), dλ(2n)]`;
/// the reduced state used by the constraint is `[θ(pvpq), |V|(pq), λ]`.
pub trait Parametrization {
    /// Evaluate `P(x, λ)` at the current point.
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        step: f64,
        z: &[f64],
        v: &[Complex64],
        lam: f64,
        v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> f64;

    /// Partial derivatives `(∂P/∂x, ∂P/∂λ)` at the current point. The state
    /// part follows the Jacobian column ordering `[θ(pvpq), |V|(pq)]`.
    #[allow(clippy::too_many_arguments)]
    fn partials(
        &self,
        z: &[f64],
        v: &[Complex64],
        lam: f64,
        v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> (Vec<f64>, f64);
}

/// Reduced state `[θ(pvpq), |V|(pq)]` without λ.
fn reduced_state(v: &[Complex64], part: &BusPartition) -> Vec<f64> {
    let mut state = Vec::with_capacity(part.nj());
    for &bus in &part.pvpq {
        state.push(v[bus].arg());
    }
    for &bus in &part.pq {
        state.push(v[bus].norm());
    }
    state
}

/// Natural parametrization: λ itself is the continuation parameter.
pub struct Natural;

impl Parametrization for Natural {
    fn evaluate(
        &self,
        step: f64,
        _z: &[f64],
        _v: &[Complex64],
        lam: f64,
        _v_prev: &[Complex64],
        lam_prev: f64,
        _part: &BusPartition,
    ) -> f64 {
        if lam >= lam_prev {
            lam - lam_prev - step
        } else {
            lam_prev - lam - step
        }
    }

    fn partials(
        &self,
        _z: &[f64],
        _v: &[Complex64],
        lam: f64,
        _v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> (Vec<f64>, f64) {
        let dp_dlam = if lam >= lam_prev { 1.0 } else { -1.0 };
        (vec![0.0; part.nj()], dp_dlam)
    }
}

/// Arc-length parametrization: fixed Euclidean distance per step.
pub struct ArcLength;

impl Parametrization for ArcLength {
    fn evaluate(
        &self,
        step: f64,
        _z: &[f64],
        v: &[Complex64],
        lam: f64,
        v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> f64 {
        let a = reduced_state(v, part);
        let b = reduced_state(v_prev, part);
        let mut acc = (lam - lam_prev) * (lam - lam_prev);
        for (x, y) in a.iter().zip(&b) {
            acc += (x - y) * (x - y);
        }
        acc - step * step
    }

    fn partials(
        &self,
        _z: &[f64],
        v: &[Complex64],
        lam: f64,
        v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> (Vec<f64>, f64) {
        let a = reduced_state(v, part);
        let b = reduced_state(v_prev, part);
        let dp_dx: Vec<f64> = a.iter().zip(&b).map(|(x, y)| 2.0 * (x - y)).collect();
        // On the first step the whole row would be zero, which makes the
        // bordered Jacobian singular; pin ∂P/∂λ to 1 instead.
        let dp_dlam = if lam == lam_prev {
            1.0
        } else {
            2.0 * (lam - lam_prev)
        };
        (dp_dx, dp_dlam)
    }
}

/// Pseudo-arc-length parametrization: fixed projection onto the previous
/// normalized tangent.
pub struct PseudoArcLength;

impl Parametrization for PseudoArcLength {
    fn evaluate(
        &self,
        step: f64,
        z: &[f64],
        v: &[Complex64],
        lam: f64,
        v_prev: &[Complex64],
        lam_prev: f64,
        part: &BusPartition,
    ) -> f64 {
        let n = v.len();
        let mut acc = z[2 * n] * (lam - lam_prev);
        for &bus in &part.pvpq {
            acc += z[bus] * (v[bus].arg() - v_prev[bus].arg());
        }
        for &bus in &part.pq {
            acc += z[n + bus] * (v[bus].norm() - v_prev[bus].norm());
        }
        acc - step
    }

    fn partials(
        &self,
        z: &[f64],
        v: &[Complex64],
        _lam: f64,
        _v_prev: &[Complex64],
        _lam_prev: f64,
        part: &BusPartition,
    ) -> (Vec<f64>, f64) {
        let n = v.len();
        let mut dp_dx = Vec::with_capacity(part.nj());
        for &bus in &part.pvpq {
            dp_dx.push(z[bus]);
        }
        for &bus in &part.pq {
            dp_dx.push(z[n + bus]);
        }
        (dp_dx, z[2 * n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstab_compile::BusKind;

    fn part_2bus() -> BusPartition {
        BusPartition::from_types(&[BusKind::Slack, BusKind::Pq])
    }

    fn flat(n: usize) -> Vec<Complex64> {
        vec![Complex64::new(1.0, 0.0); n]
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert!("natural".parse::<ParametrizationKind>().is_ok());
        assert!("arc-length".parse::<ParametrizationKind>().is_ok());
        assert!(matches!(
            "local".parse::<ParametrizationKind>(),
            Err(CpfError::InvalidOptions(_))
        ));
    }

    #[test]
    fn natural_value_and_sign_flip() {
        let part = part_2bus();
        let p = Natural;
        let v = flat(2);
        let z = vec![0.0; 5];
        // Ascending: λ = λ_prev + step satisfies the constraint
        assert!(p.evaluate(0.1, &z, &v, 0.6, &v, 0.5, &part).abs() < 1e-15);
        let (_, dl) = p.partials(&z, &v, 0.6, &v, 0.5, &part);
        assert_eq!(dl, 1.0);
        // Descending past the nose: λ = λ_prev - step satisfies it
        assert!(p.evaluate(0.1, &z, &v, 0.4, &v, 0.5, &part).abs() < 1e-15);
        let (_, dl) = p.partials(&z, &v, 0.4, &v, 0.5, &part);
        assert_eq!(dl, -1.0);
    }

    #[test]
    fn arc_length_measures_squared_distance() {
        let part = part_2bus();
        let p = ArcLength;
        let v_prev = flat(2);
        let mut v = flat(2);
        v[1] = Complex64::from_polar(0.97, -0.04);
        let z = vec![0.0; 5];
        let lam = 0.05;
        let expected = 0.04_f64.powi(2) + 0.03_f64.powi(2) + lam * lam;
        let got = p.evaluate(0.0, &z, &v, lam, &v_prev, 0.0, &part);
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn arc_length_first_step_guard() {
        let part = part_2bus();
        let p = ArcLength;
        let v = flat(2);
        let z = vec![0.0; 5];
        // λ == λ_prev: the λ-partial must be pinned to 1
        let (dx, dl) = p.partials(&z, &v, 0.0, &v, 0.0, &part);
        assert_eq!(dl, 1.0);
        assert!(dx.iter().all(|&d| d == 0.0));
        // Away from the first step it is 2·Δλ
        let (_, dl) = p.partials(&z, &v, 0.3, &v, 0.1, &part);
        assert!((dl - 0.4).abs() < 1e-15);
    }

    #[test]
    fn pseudo_arc_length_uses_tangent_slices() {
        let part = part_2bus();
        let p = PseudoArcLength;
        let v_prev = flat(2);
        let mut v = flat(2);
        v[1] = Complex64::from_polar(0.98, -0.02);
        let n = 2;
        let mut z = vec![0.0; 2 * n + 1];
        z[1] = 0.5; // dθ at bus 1
        z[n + 1] = -0.3; // d|V| at bus 1
        z[2 * n] = 0.8; // dλ
        let lam = 0.1;
        let expected = 0.5 * (-0.02 - 0.0) + (-0.3) * (0.98 - 1.0) + 0.8 * lam;
        let got = p.evaluate(0.0, &z, &v, lam, &v_prev, 0.0, &part);
        assert!((got - expected).abs() < 1e-12);

        let (dx, dl) = p.partials(&z, &v, lam, &v_prev, 0.0, &part);
        assert_eq!(dx, vec![0.5, -0.3]);
        assert_eq!(dl, 0.8);
    }
}
