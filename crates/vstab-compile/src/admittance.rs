//! Sparse admittance and connectivity matrices.
//!
//! Builds the complex bus admittance matrix together with the per-branch
//! "from"/"to" admittance rows used for flow recovery:
//!
//! ```text
//! I    = Ybus × V          (bus injections)
//! If   = Yf   × V          (current at each branch's from end)
//! It   = Yt   × V          (current at each branch's to end)
//! Ybus = Cfᵀ·Yf + Ctᵀ·Yt + shunts
//! ```
//!
//! All matrices are CSR. Construction goes through triplet accumulation so
//! parallel branches between the same bus pair sum naturally.

use num_complex::Complex64;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

use vstab_core::{BusId, Edge, Network, Node};

use crate::CompileError;

/// The sparse matrices the solvers need, plus the bus indexing that
/// produced them.
#[derive(Debug, Clone)]
pub struct AdmittanceMatrices {
    /// Number of buses
    pub n_bus: usize,
    /// Number of in-service branches
    pub n_branch: usize,
    /// Complex bus admittance matrix (n×n)
    pub ybus: CsMat<Complex64>,
    /// Branch from-end admittance rows (nbr×n)
    pub yf: CsMat<Complex64>,
    /// Branch to-end admittance rows (nbr×n)
    pub yt: CsMat<Complex64>,
    /// Branch→from-bus connectivity (nbr×n, entries are 1.0)
    pub cf: CsMat<f64>,
    /// Branch→to-bus connectivity (nbr×n, entries are 1.0)
    pub ct: CsMat<f64>,
    /// Thermal rating per in-service branch (MVA, 0.0 when unrated)
    pub branch_rates: Vec<f64>,
    /// Bus ID to index mapping
    pub bus_map: HashMap<BusId, usize>,
    /// Index to bus ID mapping
    pub idx_to_bus: Vec<BusId>,
}

/// Build admittance and connectivity matrices from a network.
///
/// Out-of-service branches are excluded entirely. A zero-impedance
/// in-service branch is a hard error; it would otherwise surface later as
/// an unexplained singular Jacobian.
pub fn build_admittance(network: &Network) -> Result<AdmittanceMatrices, CompileError> {
    // Index buses in ascending ID order so results are reproducible
    let mut bus_ids: Vec<BusId> = network
        .graph
        .node_weights()
        .filter_map(|n| match n {
            Node::Bus(b) => Some(b.id),
            _ => None,
        })
        .collect();
    bus_ids.sort_by_key(|b| b.value());

    let n_bus = bus_ids.len();
    if n_bus == 0 {
        return Err(CompileError::NoBuses);
    }
    let bus_map: HashMap<BusId, usize> = bus_ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect();

    let branches: Vec<_> = network
        .graph
        .edge_weights()
        .filter_map(|e| {
            let Edge::Branch(br) = e;
            br.status.then_some(br)
        })
        .collect();
    let n_branch = branches.len();

    let mut y_triplet = TriMat::new((n_bus, n_bus));
    let mut yf_triplet = TriMat::new((n_branch, n_bus));
    let mut yt_triplet = TriMat::new((n_branch, n_bus));
    let mut cf_triplet = TriMat::new((n_branch, n_bus));
    let mut ct_triplet = TriMat::new((n_branch, n_bus));
    let mut branch_rates = Vec::with_capacity(n_branch);

    for (k, branch) in branches.iter().enumerate() {
        let from_idx = *bus_map
            .get(&branch.from_bus)
            .ok_or(CompileError::UnknownBus(branch.from_bus.value()))?;
        let to_idx = *bus_map
            .get(&branch.to_bus)
            .ok_or(CompileError::UnknownBus(branch.to_bus.value()))?;

        // Series admittance y = 1/(r + jx)
        let z = Complex64::new(branch.resistance, branch.reactance);
        if z.norm() < 1e-12 {
            return Err(CompileError::ZeroImpedance(branch.name.clone()));
        }
        let y_series = z.inv();

        let tau = if branch.tap_ratio > 0.0 {
            branch.tap_ratio
        } else {
            1.0
        };
        let phi = branch.phase_shift.value();
        let tau2 = tau * tau;
        let shift = Complex64::from_polar(1.0, -phi);

        let y_shunt_half = Complex64::new(0.0, branch.charging_b.value() / 2.0);

        // Branch admittance rows
        let y_ff = y_series / tau2 + y_shunt_half;
        let y_tt = y_series + y_shunt_half;
        let y_ft = -y_series / tau * shift.conj();
        let y_tf = -y_series / tau * shift;

        yf_triplet.add_triplet(k, from_idx, y_ff);
        yf_triplet.add_triplet(k, to_idx, y_ft);
        yt_triplet.add_triplet(k, from_idx, y_tf);
        yt_triplet.add_triplet(k, to_idx, y_tt);

        cf_triplet.add_triplet(k, from_idx, 1.0);
        ct_triplet.add_triplet(k, to_idx, 1.0);

        // Bus matrix accumulation
        y_triplet.add_triplet(from_idx, from_idx, y_ff);
        y_triplet.add_triplet(to_idx, to_idx, y_tt);
        y_triplet.add_triplet(from_idx, to_idx, y_ft);
        y_triplet.add_triplet(to_idx, from_idx, y_tf);

        branch_rates.push(branch.rating.map(|r| r.value()).unwrap_or(0.0));
    }

    // Fixed shunts contribute to the bus matrix diagonal only
    for node in network.graph.node_weights() {
        if let Node::Shunt(shunt) = node {
            if let Some(&idx) = bus_map.get(&shunt.bus) {
                y_triplet.add_triplet(idx, idx, Complex64::new(shunt.gs_pu, shunt.bs_pu));
            }
        }
    }

    Ok(AdmittanceMatrices {
        n_bus,
        n_branch,
        ybus: y_triplet.to_csr(),
        yf: yf_triplet.to_csr(),
        yt: yt_triplet.to_csr(),
        cf: cf_triplet.to_csr(),
        ct: ct_triplet.to_csr(),
        branch_rates,
        bus_map,
        idx_to_bus: bus_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstab_core::{Branch, BranchId, Bus, BusId, Kilovolts, PerUnit};

    fn three_bus_triangle() -> Network {
        let mut network = Network::new();
        let mut idx = Vec::new();
        for i in 1..=3 {
            idx.push(network.graph.add_node(Node::Bus(Bus {
                id: BusId::new(i),
                name: format!("Bus{}", i),
                base_kv: Kilovolts(138.0),
                ..Bus::default()
            })));
        }
        let pairs = [(0usize, 1usize), (1, 2), (0, 2)];
        for (k, (a, b)) in pairs.iter().enumerate() {
            network.graph.add_edge(
                idx[*a],
                idx[*b],
                Edge::Branch(Branch {
                    id: BranchId::new(k + 1),
                    name: format!("Branch{}", k + 1),
                    from_bus: BusId::new(a + 1),
                    to_bus: BusId::new(b + 1),
                    resistance: 0.01,
                    reactance: 0.1,
                    charging_b: PerUnit(0.02),
                    ..Branch::default()
                }),
            );
        }
        network
    }

    #[test]
    fn ybus_construction() {
        let network = three_bus_triangle();
        let adm = build_admittance(&network).unwrap();
        assert_eq!(adm.n_bus, 3);
        assert_eq!(adm.n_branch, 3);
        // Diagonal should be populated
        for i in 0..3 {
            assert!(adm.ybus.get(i, i).map(|y| y.norm()).unwrap_or(0.0) > 0.0);
        }
    }

    #[test]
    fn ybus_symmetric_without_phase_shift() {
        let network = three_bus_triangle();
        let adm = build_admittance(&network).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let y_ij = adm.ybus.get(i, j).copied().unwrap_or(Complex64::new(0.0, 0.0));
                let y_ji = adm.ybus.get(j, i).copied().unwrap_or(Complex64::new(0.0, 0.0));
                assert!((y_ij - y_ji).norm() < 1e-10, "asymmetry at [{},{}]", i, j);
            }
        }
    }

    #[test]
    fn ybus_matches_branch_rows() {
        // Ybus == Cfᵀ·Yf + Ctᵀ·Yt for a network without shunts
        let network = three_bus_triangle();
        let adm = build_admittance(&network).unwrap();
        for i in 0..adm.n_bus {
            for j in 0..adm.n_bus {
                let mut acc = Complex64::new(0.0, 0.0);
                for k in 0..adm.n_branch {
                    let cf = adm.cf.get(k, i).copied().unwrap_or(0.0);
                    let ct = adm.ct.get(k, i).copied().unwrap_or(0.0);
                    let yf = adm.yf.get(k, j).copied().unwrap_or(Complex64::new(0.0, 0.0));
                    let yt = adm.yt.get(k, j).copied().unwrap_or(Complex64::new(0.0, 0.0));
                    acc += cf * yf + ct * yt;
                }
                let y = adm.ybus.get(i, j).copied().unwrap_or(Complex64::new(0.0, 0.0));
                assert!((acc - y).norm() < 1e-10, "mismatch at [{},{}]", i, j);
            }
        }
    }

    #[test]
    fn zero_impedance_rejected() {
        let mut network = Network::new();
        let b1 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(1),
            ..Bus::default()
        }));
        let b2 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(2),
            ..Bus::default()
        }));
        network.graph.add_edge(
            b1,
            b2,
            Edge::Branch(Branch::new(
                BranchId::new(1),
                "jumper".to_string(),
                BusId::new(1),
                BusId::new(2),
                0.0,
                0.0,
            )),
        );
        assert!(matches!(
            build_admittance(&network),
            Err(CompileError::ZeroImpedance(_))
        ));
    }
}
