//! Continuation driver: orchestrates the predictor-corrector loop.
//!
//! The driver is the single writer of the mutable run state (bus types,
//! scheduled injections, transfer direction, step length); predictor and
//! corrector are pure functions it threads state through. Runs are
//! strictly sequential — each step depends on the previous solution — and
//! the per-step observer is the only reentry point for callers.

use num_complex::Complex64;

use vstab_compile::{BusPartition, NumericalCircuit};
use vstab_core::Diagnostics;

use crate::flows::{branch_flows, overload_count};
use crate::qcontrol::control_q;
use crate::sparse::inf_norm;

use super::corrector::{correct, CorrectorSettings};
use super::parametrization::{Parametrization, ParametrizationKind};
use super::predictor::predict;
use super::{CpfError, CpfOptions, CpfStep, CpfTrace, StopPolicy};

/// Continuation power-flow solver.
///
/// ```no_run
/// # use vstab_algo::{ContinuationSolver, CpfOptions};
/// # use vstab_core::Diagnostics;
/// # fn demo(circ: &vstab_algo::NumericalCircuit) -> Result<(), vstab_algo::CpfError> {
/// let solver = ContinuationSolver::new(CpfOptions::default())?;
/// let base = circ.sbus();
/// let target = circ.scaled_injections(1.0, 2.0);
/// let mut diag = Diagnostics::new();
/// let trace = solver.run(circ, &base, &target, &mut diag)?;
/// println!("max loading: {:.3}", trace.max_loading());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContinuationSolver {
    options: CpfOptions,
}

impl ContinuationSolver {
    /// Create a solver, validating the options up front.
    pub fn new(options: CpfOptions) -> Result<Self, CpfError> {
        options.validate()?;
        Ok(Self { options })
    }

    /// The validated options in use.
    pub fn options(&self) -> &CpfOptions {
        &self.options
    }

    /// Run the continuation from `sbus_base` toward `sbus_target`.
    pub fn run(
        &self,
        circ: &NumericalCircuit,
        sbus_base: &[Complex64],
        sbus_target: &[Complex64],
        diag: &mut Diagnostics,
    ) -> Result<CpfTrace, CpfError> {
        self.run_with_observer(circ, sbus_base, sbus_target, diag, &mut |_| {})
    }

    /// Run the continuation, invoking `observer` once per accepted step.
    pub fn run_with_observer(
        &self,
        circ: &NumericalCircuit,
        sbus_base: &[Complex64],
        sbus_target: &[Complex64],
        diag: &mut Diagnostics,
        observer: &mut dyn FnMut(&CpfStep),
    ) -> Result<CpfTrace, CpfError> {
        let n = circ.n_bus;
        if sbus_base.len() != n || sbus_target.len() != n {
            return Err(CpfError::Dimension(format!(
                "injection vectors must have length {} (got {} and {})",
                n,
                sbus_base.len(),
                sbus_target.len()
            )));
        }

        let settings = CorrectorSettings {
            tol: self.options.tol,
            max_it: self.options.max_it,
            mu0: self.options.mu0,
            acceleration: self.options.acceleration,
        };

        // Mutable run state, single-writer by construction
        let mut parametrization: Box<dyn Parametrization> =
            self.options.parametrization.instantiate();
        let mut adapt_step = self.options.adapt_step;
        let mut step = self.options.step.clamp(self.options.step_min, self.options.step_max);

        let original_types = circ.bus_types.clone();
        let mut types = original_types.clone();
        let mut part = BusPartition::from_types(&types);
        if part.vd.is_empty() {
            return Err(CpfError::InvalidOptions(
                "circuit classification has no slack bus".into(),
            ));
        }

        let mut sbus = sbus_base.to_vec();
        let mut sxfr: Vec<Complex64> = sbus_target
            .iter()
            .zip(&sbus)
            .map(|(t, b)| t - b)
            .collect();

        let mut v = circ.v0.clone();
        let mut lam = 0.0_f64;
        let mut v_prev = v.clone();
        let mut lam_prev = lam;

        let mut z = vec![0.0; 2 * n + 1];
        z[2 * n] = 1.0;

        // PV setpoints captured once, before any switching
        let vset: Vec<f64> = v.iter().map(|c| c.norm()).collect();
        let total_installed: f64 = circ.bus_installed_power.iter().sum();

        // The run is degenerate when base and target coincide: one corrector
        // pass at λ=0 and a single-point trace.
        let sxfr_norm = sxfr.iter().fold(0.0_f64, |acc, s| acc.max(s.norm()));
        let degenerate = sxfr_norm < 1e-12;
        if degenerate {
            diag.add_warning(
                "continuation",
                "target equals base case; returning a single-point trace",
            );
        }

        let mut q_rounds = 0usize;
        let mut q_frozen = false;
        let mut trace = CpfTrace::default();

        loop {
            if trace.len() >= self.options.max_steps {
                diag.add_warning(
                    "continuation",
                    format!("step cap {} reached, stopping", self.options.max_steps),
                );
                break;
            }

            // Predict -----------------------------------------------------
            let pred = match predict(
                &v,
                lam,
                &circ.ybus,
                &sxfr,
                &part,
                step,
                &z,
                &v_prev,
                lam_prev,
                parametrization.as_ref(),
            ) {
                Ok(p) => p,
                Err(err) => {
                    if trace.is_empty() {
                        return Err(err);
                    }
                    diag.add_warning("continuation", format!("stopping: {}", err));
                    break;
                }
            };

            v_prev = v.clone();
            lam_prev = lam;
            z = pred.z.clone();

            // Correct -----------------------------------------------------
            let corr = correct(
                &circ.ybus,
                &sbus,
                &pred.v0,
                pred.lam0,
                &sxfr,
                &v_prev,
                lam_prev,
                &z,
                step,
                parametrization.as_ref(),
                &part,
                &settings,
            );
            let mut corr = match corr {
                Ok(c) => c,
                Err(err) => {
                    if trace.is_empty() {
                        return Err(err);
                    }
                    diag.add_warning("continuation", format!("stopping: {}", err));
                    break;
                }
            };

            // Distributed slack: rebalance and re-correct from the solution
            if corr.converged && self.options.distributed_slack && total_installed > 0.0 {
                let slack_power: f64 = part.vd.iter().map(|&b| corr.scalc[b].re).sum();
                let sbus_shifted: Vec<Complex64> = sbus
                    .iter()
                    .zip(&circ.bus_installed_power)
                    .map(|(s, share)| {
                        s + Complex64::new(slack_power * share / total_installed, 0.0)
                    })
                    .collect();
                let redo = correct(
                    &circ.ybus,
                    &sbus_shifted,
                    &corr.v,
                    pred.lam0,
                    &sxfr,
                    &v_prev,
                    lam_prev,
                    &z,
                    step,
                    parametrization.as_ref(),
                    &part,
                    &settings,
                );
                match redo {
                    Ok(c) => corr = c,
                    Err(err) => {
                        if trace.is_empty() {
                            return Err(err);
                        }
                        diag.add_warning("continuation", format!("stopping: {}", err));
                        break;
                    }
                }
            }

            if !corr.converged {
                if trace.is_empty() {
                    return Err(CpfError::CorrectorDivergence {
                        iterations: corr.iterations,
                        norm_f: corr.norm_f,
                    });
                }
                diag.add_warning(
                    "continuation",
                    format!(
                        "corrector diverged at λ={:.6} after {} iterations, trace ends here",
                        corr.lam, corr.iterations
                    ),
                );
                break;
            }

            v = corr.v.clone();
            lam = corr.lam;

            // Record ------------------------------------------------------
            let flows = branch_flows(circ, &v);
            let overloads = overload_count(&flows, &circ.branch_rates);
            let record = CpfStep {
                v: v.clone(),
                sbus: corr.scalc.clone(),
                lam,
                sf: flows.sf,
                st: flows.st,
                losses: flows.losses,
                loading: flows.loading,
                norm_f: corr.norm_f,
                converged: true,
            };
            observer(&record);
            trace.steps.push(record);

            if degenerate {
                break;
            }

            // Q-limit control --------------------------------------------
            if self.options.control_q && !q_frozen {
                let q: Vec<f64> = corr.scalc.iter().map(|s| s.im).collect();
                let outcome = control_q(
                    &v,
                    &q,
                    &circ.qmax_bus,
                    &circ.qmin_bus,
                    &types,
                    &original_types,
                    &vset,
                );
                if outcome.changed {
                    q_rounds += 1;
                    if q_rounds > self.options.max_q_switches {
                        diag.add_warning(
                            "q-control",
                            format!(
                                "reclassification cap {} reached, freezing Q control",
                                self.options.max_q_switches
                            ),
                        );
                        q_frozen = true;
                    } else {
                        // Rebase the schedule at the current operating point
                        // with Q pinned at the violated limits, and rebuild
                        // every classification-derived structure.
                        types = outcome.types;
                        v = outcome.v;
                        sbus = corr
                            .scalc
                            .iter()
                            .zip(&outcome.q_new)
                            .map(|(s, q)| Complex64::new(s.re, *q))
                            .collect();
                        sxfr = sbus_target
                            .iter()
                            .zip(&sbus)
                            .map(|(t, b)| t - b)
                            .collect();
                        part = BusPartition::from_types(&types);
                    }
                }
            }

            // Termination -------------------------------------------------
            match self.options.stop_at {
                StopPolicy::Full => {
                    if lam.abs() < 1e-8 || lam < 0.0 {
                        // Traced the full curve back to the base loading
                        break;
                    } else if lam < lam_prev && lam - step < 0.0 {
                        // The next step would overshoot λ=0: land exactly by
                        // fixing the step to λ under natural parametrization
                        // with adaptation off.
                        step = lam;
                        parametrization = ParametrizationKind::Natural.instantiate();
                        adapt_step = false;
                    }
                }
                StopPolicy::Nose => {
                    if lam < lam_prev {
                        break;
                    }
                }
                StopPolicy::ExtraOverloads => {
                    if overloads > self.options.base_overload_count {
                        diag.add_warning(
                            "continuation",
                            format!(
                                "{} branches overloaded (base case had {}), stopping",
                                overloads, self.options.base_overload_count
                            ),
                        );
                        break;
                    }
                }
            }

            // Step adaptation ---------------------------------------------
            if adapt_step {
                let mut err_vec = Vec::with_capacity(part.nj() + 1);
                for &bus in &part.pvpq {
                    err_vec.push(v[bus].arg() - pred.v0[bus].arg());
                }
                for &bus in &part.pq {
                    err_vec.push(v[bus].norm() - pred.v0[bus].norm());
                }
                err_vec.push(lam - pred.lam0);
                let mut cpf_error = inf_norm(&err_vec);
                if cpf_error == 0.0 {
                    cpf_error = 1e-20;
                }
                step = (step * self.options.error_tol / cpf_error)
                    .clamp(self.options.step_min, self.options.step_max);
            }
        }

        Ok(trace)
    }
}
