//! # vstab-algo: Power-Flow and Continuation Solvers
//!
//! Numerical solvers for voltage-stability analysis. Everything in this
//! crate consumes a compiled [`vstab_compile::NumericalCircuit`] — solvers
//! never read the graph model directly, so they can be tested and deployed
//! with nothing but a sparse-linear-algebra dependency.
//!
//! ## Solvers
//!
//! - [`AcSolver`]: full Newton-Raphson AC power flow with optional
//!   reactive-limit enforcement. Solves the base case that seeds a
//!   continuation run.
//! - [`ContinuationSolver`]: the continuation power flow (CPF). Traces the
//!   power-flow solution manifold from the base case toward a target
//!   loading with a normalized tangent predictor and a damped Newton
//!   corrector, detecting the voltage-collapse (nose) point.
//!
//! ## Continuation method
//!
//! ```text
//!  |V|
//!   │ ●───●───●──●─●●      upper branch (predictor steps)
//!   │                 ●●   ← nose point (Jacobian singular)
//!   │              ●●
//!   │ ●───●───●●           lower branch (traced back under Full policy)
//!   └──────────────────────── λ
//! ```
//!
//! Each step solves the augmented system `[F(x, λ); P(x, λ)] = 0` where
//! `F` are the power mismatch equations and `P` is one extra
//! parametrization constraint closing the underdetermined system. The
//! parametrization choice decides whether the trace can round the nose.
//!
//! ## References
//!
//! - Ajjarapu & Christy (1992): "The continuation power flow: A tool for
//!   steady state voltage stability analysis", IEEE Trans. Power Systems,
//!   7(1), 416-423. DOI: [10.1109/59.141737](https://doi.org/10.1109/59.141737)
//! - Tinney & Hart (1967): "Power Flow Solution by Newton's Method",
//!   IEEE Trans. PAS, 86(11), 1449-1460.
//!   DOI: [10.1109/TPAS.1967.291823](https://doi.org/10.1109/TPAS.1967.291823)

pub mod ac_pf;
pub mod continuation;
pub mod flows;
pub mod jacobian;
pub mod linsolve;
pub mod qcontrol;
pub mod sparse;

pub use ac_pf::{AcSolution, AcSolver};
pub use continuation::{
    ContinuationSolver, CpfError, CpfOptions, CpfStep, CpfSummary, CpfTrace,
    ParametrizationKind, StopPolicy,
};
pub use flows::{branch_flows, BranchFlows};
pub use vstab_compile::{BusKind, BusPartition, NumericalCircuit};
