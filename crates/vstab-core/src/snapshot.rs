//! Serializable circuit snapshot — the model's wire contract.
//!
//! A [`CircuitSnapshot`] is the flat, versioned JSON form of a [`Network`].
//! Clients (the CLI, a remote service) exchange snapshots; the graph form
//! stays an in-process detail of the model crate. `snapshot -> network` is
//! the only way external data enters the model.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::{Branch, Bus, Edge, Gen, Load, Network, Node, Shunt};

/// Schema version of the snapshot document. Increment on breaking changes.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Flat, serializable form of a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    /// Schema version, checked on load
    #[serde(default = "default_version")]
    pub version: u32,
    /// System MVA base
    pub base_mva: f64,
    pub buses: Vec<Bus>,
    #[serde(default)]
    pub gens: Vec<Gen>,
    #[serde(default)]
    pub loads: Vec<Load>,
    #[serde(default)]
    pub shunts: Vec<Shunt>,
    #[serde(default)]
    pub branches: Vec<Branch>,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl CircuitSnapshot {
    /// Capture a snapshot of a network.
    pub fn from_network(network: &Network, base_mva: f64) -> Self {
        let mut snapshot = Self {
            version: SNAPSHOT_VERSION,
            base_mva,
            buses: Vec::new(),
            gens: Vec::new(),
            loads: Vec::new(),
            shunts: Vec::new(),
            branches: Vec::new(),
        };
        for node in network.graph.node_weights() {
            match node {
                Node::Bus(b) => snapshot.buses.push(b.clone()),
                Node::Gen(g) => snapshot.gens.push(g.clone()),
                Node::Load(l) => snapshot.loads.push(l.clone()),
                Node::Shunt(s) => snapshot.shunts.push(s.clone()),
            }
        }
        for edge in network.graph.edge_weights() {
            let Edge::Branch(br) = edge;
            snapshot.branches.push(br.clone());
        }
        snapshot
    }

    /// Rebuild the graph form. Branch endpoints must reference known buses.
    pub fn into_network(self) -> CoreResult<Network> {
        if self.version != SNAPSHOT_VERSION {
            return Err(CoreError::Parse(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }

        let mut network = Network::new();
        let mut bus_nodes = std::collections::HashMap::new();
        for bus in self.buses {
            let id = bus.id;
            let idx = network.graph.add_node(Node::Bus(bus));
            bus_nodes.insert(id, idx);
        }
        for gen in self.gens {
            if !bus_nodes.contains_key(&gen.bus) {
                return Err(CoreError::Network(format!(
                    "generator {} references unknown bus {}",
                    gen.id.value(),
                    gen.bus.value()
                )));
            }
            network.graph.add_node(Node::Gen(gen));
        }
        for load in self.loads {
            if !bus_nodes.contains_key(&load.bus) {
                return Err(CoreError::Network(format!(
                    "load {} references unknown bus {}",
                    load.id.value(),
                    load.bus.value()
                )));
            }
            network.graph.add_node(Node::Load(load));
        }
        for shunt in self.shunts {
            if !bus_nodes.contains_key(&shunt.bus) {
                return Err(CoreError::Network(format!(
                    "shunt {} references unknown bus {}",
                    shunt.id.value(),
                    shunt.bus.value()
                )));
            }
            network.graph.add_node(Node::Shunt(shunt));
        }
        for branch in self.branches {
            let from = *bus_nodes.get(&branch.from_bus).ok_or_else(|| {
                CoreError::Network(format!(
                    "branch {} references unknown bus {}",
                    branch.id.value(),
                    branch.from_bus.value()
                ))
            })?;
            let to = *bus_nodes.get(&branch.to_bus).ok_or_else(|| {
                CoreError::Network(format!(
                    "branch {} references unknown bus {}",
                    branch.id.value(),
                    branch.to_bus.value()
                ))
            })?;
            network.graph.add_edge(from, to, Edge::Branch(branch));
        }
        Ok(network)
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
