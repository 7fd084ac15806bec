//! # vstab-core: Power Grid Modeling Core
//!
//! Provides the canonical network model for voltage-stability analysis.
//! This crate is the single source of truth for network state: every other
//! crate in the workspace consumes snapshots of this model, never a second
//! copy of it.
//!
//! ## Design Philosophy
//!
//! Networks are modeled as **undirected multigraphs** where:
//! - **Nodes**: Buses, generators, loads, and shunts
//! - **Edges**: Branches (transmission lines and transformers)
//!
//! This graph-based approach enables:
//! - Fast topological queries (connectivity, island detection)
//! - Type-safe element access with newtype IDs
//! - Support for multiple edge types between the same nodes (parallel branches)
//!
//! ## Quick Start
//!
//! ```rust
//! use vstab_core::*;
//!
//! let mut network = Network::new();
//!
//! let bus1_idx = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(1),
//!     name: "Bus 1".to_string(),
//!     base_kv: Kilovolts(138.0),
//!     ..Bus::default()
//! }));
//!
//! let bus2_idx = network.graph.add_node(Node::Bus(Bus {
//!     id: BusId::new(2),
//!     name: "Bus 2".to_string(),
//!     base_kv: Kilovolts(138.0),
//!     ..Bus::default()
//! }));
//!
//! network.graph.add_node(Node::Gen(
//!     Gen::new(GenId::new(1), "Gen 1".to_string(), BusId::new(1)).with_q_limits(-50.0, 50.0),
//! ));
//!
//! network.graph.add_edge(
//!     bus1_idx,
//!     bus2_idx,
//!     Edge::Branch(Branch::new(
//!         BranchId::new(1),
//!         "Line 1-2".to_string(),
//!         BusId::new(1),
//!         BusId::new(2),
//!         0.01,
//!         0.1,
//!     )),
//! );
//! ```
//!
//! ## Modules
//!
//! - [`diagnostics`] - Caller-owned validation and diagnostic reporting
//! - [`snapshot`] - Serializable circuit snapshot (the model's wire contract)
//! - [`units`] - Compile-time unit safety for physical quantities

use petgraph::{prelude::*, Undirected};
use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod error;
pub mod snapshot;
pub mod units;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{CoreError, CoreResult};
pub use snapshot::CircuitSnapshot;
pub use units::{Degrees, Kilovolts, Megavars, MegavoltAmperes, Megawatts, PerUnit, Radians};

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShuntId(usize);

macro_rules! impl_id {
    ($type:ty) => {
        impl $type {
            #[inline]
            pub fn new(value: usize) -> Self {
                Self(value)
            }
            #[inline]
            pub fn value(&self) -> usize {
                self.0
            }
        }
    };
}

impl_id!(BusId);
impl_id!(BranchId);
impl_id!(GenId);
impl_id!(LoadId);
impl_id!(ShuntId);

/// A bus (electrical node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    /// Base voltage in kilovolts (for per-unit conversions)
    pub base_kv: Kilovolts,
    /// Voltage magnitude in per-unit (initial / solved state)
    pub voltage_pu: PerUnit,
    /// Voltage angle in radians (initial / solved state)
    pub angle_rad: Radians,
    /// Minimum voltage limit in per-unit
    pub vmin_pu: Option<PerUnit>,
    /// Maximum voltage limit in per-unit
    pub vmax_pu: Option<PerUnit>,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            id: BusId(0),
            name: String::new(),
            base_kv: Kilovolts(0.0),
            voltage_pu: PerUnit(1.0),
            angle_rad: Radians(0.0),
            vmin_pu: None,
            vmax_pu: None,
        }
    }
}

/// A branch (transmission line or transformer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from_bus: BusId,
    pub to_bus: BusId,
    /// Series resistance (per-unit)
    pub resistance: f64,
    /// Series reactance (per-unit)
    pub reactance: f64,
    /// Multiplicative tap magnitude applied from from_bus to to_bus
    pub tap_ratio: f64,
    /// Phase shift applied from from_bus to to_bus
    pub phase_shift: Radians,
    /// Total line charging susceptance (per-unit, split half/half)
    pub charging_b: PerUnit,
    /// Thermal rating (MVA), used for loading and overload checks
    pub rating: Option<MegavoltAmperes>,
    /// Operational status flag
    pub status: bool,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            id: BranchId(0),
            name: String::new(),
            from_bus: BusId(0),
            to_bus: BusId(0),
            resistance: 0.0,
            reactance: 0.0,
            tap_ratio: 1.0,
            phase_shift: Radians(0.0),
            charging_b: PerUnit(0.0),
            rating: None,
            status: true,
        }
    }
}

impl Branch {
    /// Construct a branch from impedance fields, filling the rest with defaults.
    pub fn new(
        id: BranchId,
        name: String,
        from_bus: BusId,
        to_bus: BusId,
        resistance: f64,
        reactance: f64,
    ) -> Self {
        Self {
            id,
            name,
            from_bus,
            to_bus,
            resistance,
            reactance,
            ..Self::default()
        }
    }

    /// Attach a thermal rating in MVA.
    pub fn with_rating(mut self, rating_mva: f64) -> Self {
        self.rating = Some(MegavoltAmperes(rating_mva));
        self
    }
}

/// A generator attached to a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gen {
    pub id: GenId,
    pub name: String,
    pub bus: BusId,
    /// Active power output (MW)
    pub active_power: Megawatts,
    /// Reactive power output (Mvar)
    pub reactive_power: Megavars,
    /// Minimum reactive power output
    pub qmin: Megavars,
    /// Maximum reactive power output
    pub qmax: Megavars,
    /// Installed capacity (MW), drives distributed-slack shares
    pub installed_mw: Megawatts,
    /// In-service status
    pub status: bool,
    /// Voltage setpoint (per-unit) for PV operation
    pub voltage_setpoint: Option<PerUnit>,
}

impl Default for Gen {
    fn default() -> Self {
        Self {
            id: GenId(0),
            name: String::new(),
            bus: BusId(0),
            active_power: Megawatts(0.0),
            reactive_power: Megavars(0.0),
            qmin: Megavars(f64::NEG_INFINITY),
            qmax: Megavars(f64::INFINITY),
            installed_mw: Megawatts(0.0),
            status: true,
            voltage_setpoint: None,
        }
    }
}

impl Gen {
    /// Create a new generator with unconstrained limits.
    pub fn new(id: GenId, name: String, bus: BusId) -> Self {
        Self {
            id,
            name,
            bus,
            ..Self::default()
        }
    }

    /// Set reactive power limits (in Mvar)
    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin = Megavars(qmin);
        self.qmax = Megavars(qmax);
        self
    }

    /// Set active power output (in MW)
    pub fn with_active_power(mut self, p_mw: f64) -> Self {
        self.active_power = Megawatts(p_mw);
        self
    }

    /// Set voltage setpoint (per-unit)
    pub fn with_setpoint(mut self, v_pu: f64) -> Self {
        self.voltage_setpoint = Some(PerUnit(v_pu));
        self
    }

    /// Set installed capacity (in MW)
    pub fn with_installed(mut self, p_mw: f64) -> Self {
        self.installed_mw = Megawatts(p_mw);
        self
    }
}

/// A load attached to a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Load {
    pub id: LoadId,
    pub name: String,
    pub bus: BusId,
    /// Active power demand (MW)
    pub active_power: Megawatts,
    /// Reactive power demand (Mvar)
    pub reactive_power: Megavars,
}

/// A fixed shunt admittance attached to a bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shunt {
    pub id: ShuntId,
    pub name: String,
    pub bus: BusId,
    /// Shunt conductance (per-unit)
    pub gs_pu: f64,
    /// Shunt susceptance (per-unit)
    pub bs_pu: f64,
}

/// Node variants of the network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    Bus(Bus),
    Gen(Gen),
    Load(Load),
    Shunt(Shunt),
}

/// Edge variants of the network graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Edge {
    Branch(Branch),
}

/// The main network container.
#[derive(Debug, Clone, Default)]
pub struct Network {
    pub graph: Graph<Node, Edge, Undirected>,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new_undirected(),
        }
    }

    /// Compute basic statistics about the network
    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats::default();

        for node in self.graph.node_weights() {
            match node {
                Node::Bus(_) => stats.num_buses += 1,
                Node::Gen(g) => {
                    stats.num_gens += 1;
                    stats.total_gen_mw += g.active_power.value();
                }
                Node::Load(l) => {
                    stats.num_loads += 1;
                    stats.total_load_mw += l.active_power.value();
                    stats.total_load_mvar += l.reactive_power.value();
                }
                Node::Shunt(_) => stats.num_shunts += 1,
            }
        }

        stats.num_branches = self.graph.edge_count();
        stats
    }

    /// Validate network data for common issues that cause solver failures.
    ///
    /// Populates the provided `Diagnostics` with any warnings/errors found.
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        let stats = self.stats();

        if stats.num_buses == 0 {
            diag.add_error("structure", "Network has no buses");
            return;
        }

        if stats.num_gens == 0 {
            diag.add_error("structure", "Network has no generators (no slack candidate)");
        }

        for node in self.graph.node_weights() {
            match node {
                Node::Gen(g) => {
                    if g.qmin.value() > g.qmax.value() {
                        diag.add_error_with_entity(
                            "limits",
                            "Generator Qmin exceeds Qmax",
                            format!("Gen {}", g.id.value()),
                        );
                    }
                }
                Node::Bus(b) => {
                    if b.voltage_pu.value() <= 0.0 {
                        diag.add_error_with_entity(
                            "physical",
                            "Bus initial voltage must be positive",
                            format!("Bus {}", b.id.value()),
                        );
                    }
                }
                _ => {}
            }
        }

        for edge in self.graph.edge_weights() {
            let Edge::Branch(br) = edge;
            if br.status && br.resistance == 0.0 && br.reactance == 0.0 {
                diag.add_warning_with_entity(
                    "physical",
                    "In-service branch has zero impedance",
                    format!("Branch {}", br.id.value()),
                );
            }
        }
    }
}

/// Summary counters for a network.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkStats {
    pub num_buses: usize,
    pub num_gens: usize,
    pub num_loads: usize,
    pub num_shunts: usize,
    pub num_branches: usize,
    pub total_load_mw: f64,
    pub total_load_mvar: f64,
    pub total_gen_mw: f64,
}

impl std::fmt::Display for NetworkStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buses, {} branches, {} gens ({:.0} MW), {} loads ({:.0} MW)",
            self.num_buses,
            self.num_branches,
            self.num_gens,
            self.total_gen_mw,
            self.num_loads,
            self.total_load_mw
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bus() -> Network {
        let mut network = Network::new();
        let b1 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(1),
            name: "b1".to_string(),
            base_kv: Kilovolts(138.0),
            ..Bus::default()
        }));
        let b2 = network.graph.add_node(Node::Bus(Bus {
            id: BusId::new(2),
            name: "b2".to_string(),
            base_kv: Kilovolts(138.0),
            ..Bus::default()
        }));
        network.graph.add_node(Node::Gen(Gen::new(
            GenId::new(1),
            "g1".to_string(),
            BusId::new(1),
        )));
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
    fn stats_count_elements() {
        let network = two_bus();
        let stats = network.stats();
        assert_eq!(stats.num_buses, 2);
        assert_eq!(stats.num_gens, 1);
        assert_eq!(stats.num_loads, 1);
        assert_eq!(stats.num_branches, 1);
        assert!((stats.total_load_mw - 50.0).abs() < 1e-12);
    }

    #[test]
    fn validate_flags_inverted_q_limits() {
        let mut network = two_bus();
        network.graph.add_node(Node::Gen(
            Gen::new(GenId::new(2), "bad".to_string(), BusId::new(2)).with_q_limits(10.0, -10.0),
        ));
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert!(diag.error_count() >= 1);
    }

    #[test]
    fn validate_empty_network() {
        let network = Network::new();
        let mut diag = Diagnostics::new();
        network.validate_into(&mut diag);
        assert_eq!(diag.error_count(), 1);
    }
}
