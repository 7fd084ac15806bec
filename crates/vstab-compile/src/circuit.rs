//! Compilation of a network snapshot into solver-ready numerical arrays.
//!
//! [`compile`] is the single entry point. It classifies buses, builds the
//! sparse matrices, converts injections to per-unit, and collects the
//! per-bus reactive limits and installed capacity the continuation driver
//! needs for Q-limit control and distributed slack.

use num_complex::Complex64;
use sprs::CsMat;
use std::collections::HashMap;

use vstab_core::{BusId, Diagnostics, Network, Node};

use crate::admittance::{build_admittance, AdmittanceMatrices};
use crate::{BusKind, CompileError};

/// Options controlling numerical compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// System MVA base for per-unit conversion
    pub base_mva: f64,
    /// Explicit slack bus; defaults to the first in-service generator's bus
    pub slack_bus: Option<BusId>,
    /// Ignore stored bus voltages and start from 1.0∠0
    pub flat_start: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            base_mva: 100.0,
            slack_bus: None,
            flat_start: false,
        }
    }
}

/// Solver-ready numerical form of a circuit snapshot.
///
/// Everything here is indexed by the dense bus index (0..n_bus) fixed at
/// compile time; `bus_ids` maps back to model identifiers. The matrices are
/// read-only for the lifetime of a solver run.
#[derive(Debug, Clone)]
pub struct NumericalCircuit {
    pub n_bus: usize,
    pub n_branch: usize,
    /// System MVA base
    pub sbase: f64,
    /// Complex bus admittance matrix (n×n)
    pub ybus: CsMat<Complex64>,
    /// Branch from-end admittance rows (nbr×n)
    pub yf: CsMat<Complex64>,
    /// Branch to-end admittance rows (nbr×n)
    pub yt: CsMat<Complex64>,
    /// Branch→from-bus connectivity (nbr×n)
    pub cf: CsMat<f64>,
    /// Branch→to-bus connectivity (nbr×n)
    pub ct: CsMat<f64>,
    /// Thermal rating per branch (MVA, 0.0 when unrated)
    pub branch_rates: Vec<f64>,
    /// Initial complex voltages
    pub v0: Vec<Complex64>,
    /// Bus classification at compile time
    pub bus_types: Vec<BusKind>,
    /// Generation injection per bus (p.u.)
    pub sbus_gen: Vec<Complex64>,
    /// Load withdrawal per bus (p.u., positive = consumption)
    pub sbus_load: Vec<Complex64>,
    /// Per-bus aggregate reactive lower limit (p.u.)
    pub qmin_bus: Vec<f64>,
    /// Per-bus aggregate reactive upper limit (p.u.)
    pub qmax_bus: Vec<f64>,
    /// Installed generation capacity per bus (p.u.), drives slack shares
    pub bus_installed_power: Vec<f64>,
    /// Dense index -> model bus ID
    pub bus_ids: Vec<BusId>,
}

impl NumericalCircuit {
    /// Net scheduled injection per bus: generation minus load (p.u.)
    pub fn sbus(&self) -> Vec<Complex64> {
        self.sbus_gen
            .iter()
            .zip(&self.sbus_load)
            .map(|(g, l)| *g - *l)
            .collect()
    }

    /// Net injection with generation and load scaled independently.
    ///
    /// The continuation target case is typically `scaled_injections(g, l)`
    /// with `l > 1`: the traced transfer direction becomes the difference
    /// between that vector and the base `sbus()`.
    pub fn scaled_injections(&self, gen_scale: f64, load_scale: f64) -> Vec<Complex64> {
        self.sbus_gen
            .iter()
            .zip(&self.sbus_load)
            .map(|(g, l)| *g * gen_scale - *l * load_scale)
            .collect()
    }
}

/// Compile a network into numerical arrays.
///
/// Pure function of `(network, options)`; warnings (e.g., a generator at a
/// bus that also hosts the slack) land in the caller-owned diagnostics.
pub fn compile(
    network: &Network,
    options: &CompileOptions,
    diag: &mut Diagnostics,
) -> Result<NumericalCircuit, CompileError> {
    let AdmittanceMatrices {
        n_bus,
        n_branch,
        ybus,
        yf,
        yt,
        cf,
        ct,
        branch_rates,
        bus_map,
        idx_to_bus,
    } = build_admittance(network)?;

    let sbase = options.base_mva;

    // Collect per-bus quantities from devices
    let mut sbus_gen = vec![Complex64::new(0.0, 0.0); n_bus];
    let mut sbus_load = vec![Complex64::new(0.0, 0.0); n_bus];
    let mut qmin_bus = vec![0.0; n_bus];
    let mut qmax_bus = vec![0.0; n_bus];
    let mut installed = vec![0.0; n_bus];
    let mut has_gen = vec![false; n_bus];
    let mut setpoint: Vec<Option<f64>> = vec![None; n_bus];
    let mut first_gen_bus: Option<usize> = None;

    for node in network.graph.node_weights() {
        match node {
            Node::Gen(gen) => {
                if !gen.status {
                    continue;
                }
                let idx = *bus_map
                    .get(&gen.bus)
                    .ok_or(CompileError::UnknownBus(gen.bus.value()))?;
                sbus_gen[idx] += Complex64::new(
                    gen.active_power.value() / sbase,
                    gen.reactive_power.value() / sbase,
                );
                qmin_bus[idx] += gen.qmin.value() / sbase;
                qmax_bus[idx] += gen.qmax.value() / sbase;
                installed[idx] += gen.installed_mw.value() / sbase;
                has_gen[idx] = true;
                if first_gen_bus.is_none() {
                    first_gen_bus = Some(idx);
                }
                if let Some(v) = gen.voltage_setpoint {
                    if let Some(prev) = setpoint[idx] {
                        if (prev - v.value()).abs() > 1e-9 {
                            diag.add_warning_with_entity(
                                "compile",
                                "conflicting voltage setpoints at bus, keeping the first",
                                format!("Bus {}", gen.bus.value()),
                            );
                        }
                    } else {
                        setpoint[idx] = Some(v.value());
                    }
                }
            }
            Node::Load(load) => {
                let idx = *bus_map
                    .get(&load.bus)
                    .ok_or(CompileError::UnknownBus(load.bus.value()))?;
                sbus_load[idx] += Complex64::new(
                    load.active_power.value() / sbase,
                    load.reactive_power.value() / sbase,
                );
            }
            _ => {}
        }
    }

    // Classify: generator buses are PV, one of them is the slack
    let slack_idx = match options.slack_bus {
        Some(id) => {
            let idx = *bus_map.get(&id).ok_or(CompileError::BadSlack(id.value()))?;
            if !has_gen[idx] {
                diag.add_warning_with_entity(
                    "compile",
                    "designated slack bus has no in-service generator",
                    format!("Bus {}", id.value()),
                );
            }
            idx
        }
        None => first_gen_bus.ok_or(CompileError::NoSlack)?,
    };

    let mut bus_types = vec![BusKind::Pq; n_bus];
    for (idx, has) in has_gen.iter().enumerate() {
        if *has {
            bus_types[idx] = BusKind::Pv;
        }
    }
    bus_types[slack_idx] = BusKind::Slack;

    // Initial voltages: stored state or flat, PV magnitudes pinned to setpoint
    let mut v0 = vec![Complex64::new(1.0, 0.0); n_bus];
    if !options.flat_start {
        for node in network.graph.node_weights() {
            if let Node::Bus(bus) = node {
                if let Some(&idx) = bus_map.get(&bus.id) {
                    v0[idx] =
                        Complex64::from_polar(bus.voltage_pu.value(), bus.angle_rad.value());
                }
            }
        }
    }
    for idx in 0..n_bus {
        if bus_types[idx] != BusKind::Pq {
            if let Some(vset) = setpoint[idx] {
                v0[idx] = Complex64::from_polar(vset, v0[idx].arg());
            }
        }
    }

    Ok(NumericalCircuit {
        n_bus,
        n_branch,
        sbase,
        ybus,
        yf,
        yt,
        cf,
        ct,
        branch_rates,
        v0,
        bus_types,
        sbus_gen,
        sbus_load,
        qmin_bus,
        qmax_bus,
        bus_installed_power: installed,
        bus_ids: idx_to_bus,
    })
}

/// Convenience: map from bus ID to dense index for a compiled circuit.
pub fn bus_index_map(circ: &NumericalCircuit) -> HashMap<BusId, usize> {
    circ.bus_ids
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vstab_core::{Branch, BranchId, Bus, Edge, Gen, GenId, Kilovolts, Load, LoadId, Megavars, Megawatts};

    fn two_bus() -> Network {
        let mut network = Network::new();
        let b1 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(1),
            name: "slack".to_string(),
            base_kv: Kilovolts(138.0),
            ..Bus::default()
        }));
        let b2 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(2),
            name: "load".to_string(),
            base_kv: Kilovolts(138.0),
            ..Bus::default()
        }));
        network.graph.add_node(Node::Gen(
            Gen::new(GenId::new(1), "g1".to_string(), BusId::new(1)).with_q_limits(-100.0, 100.0),
        ));
        network.graph.add_node(Node::Load(Load {
            id: LoadId::new(1),
            name: "l1".to_string(),
            bus: BusId::new(2),
            active_power: Megawatts(50.0),
            reactive_power: Megavars(20.0),
        }));
        network.graph.add_edge(
            b1,
            b2,
            Edge::Branch(Branch::new(
                BranchId::new(1),
                "line".to_string(),
                BusId::new(1),
                BusId::new(2),
                0.01,
                0.1,
            )),
        );
        network
    }

    #[test]
    fn compile_classifies_and_converts() {
        let network = two_bus();
        let mut diag = Diagnostics::new();
        let circ = compile(&network, &CompileOptions::default(), &mut diag).unwrap();
        assert_eq!(circ.n_bus, 2);
        assert_eq!(circ.bus_types[0], BusKind::Slack);
        assert_eq!(circ.bus_types[1], BusKind::Pq);
        let sbus = circ.sbus();
        assert!((sbus[1].re + 0.5).abs() < 1e-12);
        assert!((sbus[1].im + 0.2).abs() < 1e-12);
        assert!((circ.qmax_bus[0] - 1.0).abs() < 1e-12);
        assert!(!diag.has_errors());
    }

    #[test]
    fn scaled_injections_scale_load_only() {
        let network = two_bus();
        let mut diag = Diagnostics::new();
        let circ = compile(&network, &CompileOptions::default(), &mut diag).unwrap();
        let target = circ.scaled_injections(1.0, 2.0);
        assert!((target[1].re + 1.0).abs() < 1e-12);
        assert!((target[1].im + 0.4).abs() < 1e-12);
    }

    #[test]
    fn no_generator_is_an_error() {
        let mut network = Network::new();
        network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(1),
            ..Bus::default()
        }));
        let mut diag = Diagnostics::new();
        assert!(matches!(
            compile(&network, &CompileOptions::default(), &mut diag),
            Err(CompileError::NoSlack)
        ));
    }
}
