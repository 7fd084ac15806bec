//! Per-branch flow recovery from a solved voltage profile.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use vstab_compile::NumericalCircuit;

use crate::sparse::{mul_vec, mul_vec_real};

/// Branch flow quantities for one operating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFlows {
    /// Complex power entering each branch at the from end (MVA)
    pub sf: Vec<Complex64>,
    /// Complex power entering each branch at the to end (MVA)
    pub st: Vec<Complex64>,
    /// Series + shunt losses per branch (MVA)
    pub losses: Vec<Complex64>,
    /// Active-power loading relative to the branch rating
    pub loading: Vec<f64>,
}

/// Compute branch flows: `Sf = (Cf·V) ⊙ conj(Yf·V) · Sbase`, and the same
/// at the to end. Loading uses the active from-end flow against the rating;
/// a small offset keeps unrated branches from dividing by zero.
pub fn branch_flows(circ: &NumericalCircuit, v: &[Complex64]) -> BranchFlows {
    let vf = mul_vec_real(&circ.cf, v);
    let vt = mul_vec_real(&circ.ct, v);
    let if_ = mul_vec(&circ.yf, v);
    let it = mul_vec(&circ.yt, v);

    let sf: Vec<Complex64> = vf
        .iter()
        .zip(&if_)
        .map(|(vf, i)| vf * i.conj() * circ.sbase)
        .collect();
    let st: Vec<Complex64> = vt
        .iter()
        .zip(&it)
        .map(|(vt, i)| vt * i.conj() * circ.sbase)
        .collect();
    let losses: Vec<Complex64> = sf.iter().zip(&st).map(|(f, t)| f + t).collect();
    let loading: Vec<f64> = sf
        .iter()
        .zip(&circ.branch_rates)
        .map(|(f, r)| f.re / (r + 1e-9))
        .collect();

    BranchFlows {
        sf,
        st,
        losses,
        loading,
    }
}

/// Count branches loaded past their rating. Unrated branches are skipped —
/// an unknown limit cannot be violated.
pub fn overload_count(flows: &BranchFlows, rates: &[f64]) -> usize {
    flows
        .loading
        .iter()
        .zip(rates)
        .filter(|(l, r)| **r > 0.0 && l.abs() > 1.0)
        .count()
}
