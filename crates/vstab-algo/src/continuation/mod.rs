//! Continuation power flow (CPF).
//!
//! Traces the power-flow solution manifold from a solved base case (λ=0)
//! toward a target loading (λ=1 and beyond), detecting the voltage
//! collapse point. Each continuation step runs a tangent [`predictor`]
//! followed by a damped Newton [`corrector`] on the augmented system; the
//! [`driver`] orchestrates the loop with adaptive step control, optional
//! reactive-limit switching, distributed slack, and the stop policy.
//!
//! ```text
//! Init ─> Predict ─> Correct ─> [Distribute slack, re-Correct]
//!           ▲                         │
//!           │                         v
//!       AdaptStep <── CheckTermination <── CheckQLimits <── record step
//! ```

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

pub mod corrector;
pub mod driver;
pub mod parametrization;
pub mod predictor;

pub use corrector::{CorrectorOutput, CorrectorSettings};
pub use driver::ContinuationSolver;
pub use parametrization::{Parametrization, ParametrizationKind};
pub use predictor::PredictorOutput;

/// Which half of a continuation step a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Predictor,
    Corrector,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Predictor => f.write_str("predictor"),
            Stage::Corrector => f.write_str("corrector"),
        }
    }
}

/// Continuation solver errors.
///
/// A mid-run corrector failure is not an error: the driver stops and the
/// trace accumulated so far is returned intact. These variants cover the
/// cases where no trustworthy trace exists at all.
#[derive(Debug, Error)]
pub enum CpfError {
    /// The augmented Jacobian was singular to working precision
    #[error("singular augmented Jacobian in the {stage}")]
    SingularJacobian { stage: Stage },

    /// The corrector failed on the very first continuation step
    #[error(
        "corrector diverged on the first continuation step after {iterations} iterations \
         (residual {norm_f:.3e})"
    )]
    CorrectorDivergence { iterations: usize, norm_f: f64 },

    /// Options failed validation at run start
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Input arrays disagree with the compiled circuit
    #[error("dimension mismatch: {0}")]
    Dimension(String),
}

/// Where the continuation run should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Stop at the nose point (λ starts decreasing)
    Nose,
    /// Trace the full curve back down to λ ≈ 0
    Full,
    /// Stop once more branches are overloaded than in the base case
    ExtraOverloads,
}

impl FromStr for StopPolicy {
    type Err = CpfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nose" => Ok(StopPolicy::Nose),
            "full" => Ok(StopPolicy::Full),
            "extra-overloads" => Ok(StopPolicy::ExtraOverloads),
            other => Err(CpfError::InvalidOptions(format!(
                "unknown stop policy '{}' (expected nose, full or extra-overloads)",
                other
            ))),
        }
    }
}

/// Continuation run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpfOptions {
    /// Initial continuation step length
    pub step: f64,
    /// Smallest step the adaptation may shrink to
    pub step_min: f64,
    /// Largest step the adaptation may grow to
    pub step_max: f64,
    /// Grow/shrink the step from the predictor-corrector error
    pub adapt_step: bool,
    /// Target predictor-corrector error for the step adaptation
    pub error_tol: f64,
    /// Corrector convergence tolerance (p.u.)
    pub tol: f64,
    /// Maximum Newton iterations per corrector call
    pub max_it: usize,
    /// Initial Newton damping factor
    pub mu0: f64,
    /// Backtracking shrink factor
    pub acceleration: f64,
    /// Parametrization scheme
    pub parametrization: ParametrizationKind,
    /// Termination policy
    pub stop_at: StopPolicy,
    /// Enforce generator reactive limits during the trace
    pub control_q: bool,
    /// Cap on PV↔PQ reclassification rounds per run
    pub max_q_switches: usize,
    /// Redistribute the slack imbalance by installed power share
    pub distributed_slack: bool,
    /// Overload count of the base case (for [`StopPolicy::ExtraOverloads`])
    pub base_overload_count: usize,
    /// Hard cap on accepted continuation steps
    pub max_steps: usize,
}

impl Default for CpfOptions {
    fn default() -> Self {
        Self {
            step: 0.05,
            step_min: 1e-5,
            step_max: 0.2,
            adapt_step: true,
            error_tol: 1e-3,
            tol: 1e-6,
            max_it: 20,
            mu0: 1.0,
            acceleration: 0.5,
            parametrization: ParametrizationKind::ArcLength,
            stop_at: StopPolicy::Nose,
            control_q: false,
            max_q_switches: 10,
            distributed_slack: false,
            base_overload_count: 0,
            max_steps: 5000,
        }
    }
}

impl CpfOptions {
    /// Validate the configuration. Called by the driver at run start.
    pub fn validate(&self) -> Result<(), CpfError> {
        if !(self.step > 0.0) {
            return Err(CpfError::InvalidOptions("step must be positive".into()));
        }
        if !(self.step_min > 0.0) || self.step_min > self.step_max {
            return Err(CpfError::InvalidOptions(
                "step bounds must satisfy 0 < step_min <= step_max".into(),
            ));
        }
        if !(self.tol > 0.0) || !(self.error_tol > 0.0) {
            return Err(CpfError::InvalidOptions("tolerances must be positive".into()));
        }
        if self.max_it == 0 {
            return Err(CpfError::InvalidOptions("max_it must be at least 1".into()));
        }
        if !(self.mu0 > 0.0 && self.mu0 <= 1.0) {
            return Err(CpfError::InvalidOptions("mu0 must lie in (0, 1]".into()));
        }
        if !(self.acceleration > 0.0 && self.acceleration < 1.0) {
            return Err(CpfError::InvalidOptions(
                "acceleration must lie in (0, 1)".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(CpfError::InvalidOptions("max_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// One accepted point on the continuation curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpfStep {
    /// Complex voltages
    pub v: Vec<Complex64>,
    /// Calculated complex injections (p.u.)
    pub sbus: Vec<Complex64>,
    /// Loading parameter
    pub lam: f64,
    /// From-end branch flows (MVA)
    pub sf: Vec<Complex64>,
    /// To-end branch flows (MVA)
    pub st: Vec<Complex64>,
    /// Branch losses (MVA)
    pub losses: Vec<Complex64>,
    /// Branch loadings relative to rating
    pub loading: Vec<f64>,
    /// Corrector residual norm at acceptance
    pub norm_f: f64,
    /// Corrector convergence flag (always true for recorded steps)
    pub converged: bool,
}

/// Append-only trace of accepted continuation steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpfTrace {
    pub steps: Vec<CpfStep>,
}

impl CpfTrace {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Highest loading reached along the trace.
    pub fn max_loading(&self) -> f64 {
        self.steps.iter().map(|s| s.lam).fold(0.0, f64::max)
    }

    /// The PV (nose) curve at a bus: `(λ, |V|)` per accepted step.
    pub fn nose_curve(&self, bus: usize) -> Vec<(f64, f64)> {
        self.steps
            .iter()
            .map(|s| (s.lam, s.v[bus].norm()))
            .collect()
    }

    /// Summarize the trace for reporting.
    pub fn summary(&self) -> CpfSummary {
        let max_loading = self.max_loading();
        let critical_bus = self
            .steps
            .iter()
            .max_by(|a, b| a.lam.total_cmp(&b.lam))
            .and_then(|s| {
                s.v.iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
                    .map(|(i, _)| i)
            });
        CpfSummary {
            steps: self.len(),
            max_loading,
            loading_margin: max_loading - 1.0,
            critical_bus,
        }
    }
}

/// Compact result of a continuation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpfSummary {
    /// Number of accepted continuation steps
    pub steps: usize,
    /// Maximum loading factor λ_max before collapse or stop
    pub max_loading: f64,
    /// Margin beyond the target case (λ_max - 1), negative when the target
    /// loading itself is infeasible
    pub loading_margin: f64,
    /// Bus with the lowest voltage at maximum loading
    pub critical_bus: Option<usize>,
}
