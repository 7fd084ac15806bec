//! # vstab-compile: Numerical Compilation
//!
//! Pure, stateless translation from the canonical network model to the
//! numerical arrays the solvers consume: sparse admittance matrices,
//! branch/bus connectivity, bus classification, and per-unit injection
//! vectors.
//!
//! This is the only crate that reads the graph model on behalf of the
//! solvers. Solver crates never see a [`vstab_core::Network`]; they receive
//! a [`NumericalCircuit`] and nothing else. Because compilation is a pure
//! function of `(network, options)`, identical inputs always produce
//! identical outputs, which makes the boundary memoizable by any caller.
//!
//! ```text
//! Network ──compile(options)──> NumericalCircuit ──> AC PF / CPF solvers
//! ```

use serde::{Deserialize, Serialize};

pub mod admittance;
pub mod circuit;
pub mod partition;

pub use admittance::{build_admittance, AdmittanceMatrices};
pub use circuit::{compile, CompileOptions, NumericalCircuit};
pub use partition::BusPartition;

use thiserror::Error;

/// Errors from numerical compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("No buses found in network")]
    NoBuses,

    #[error("No in-service generator available to provide a slack bus")]
    NoSlack,

    #[error("Branch {0} has zero impedance")]
    ZeroImpedance(String),

    #[error("Unknown bus ID: {0}")]
    UnknownBus(usize),

    #[error("Designated slack bus {0} does not exist")]
    BadSlack(usize),
}

/// Bus classification for power-flow computations.
///
/// - `Slack`: V and θ fixed, P and Q free (one or more per island)
/// - `Pv`: P and |V| specified, Q and θ free (voltage-controlled generation)
/// - `Pq`: P and Q specified, |V| and θ free (loads)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusKind {
    Slack,
    Pv,
    Pq,
}
