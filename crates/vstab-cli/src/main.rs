//! `vstab` — voltage-stability analysis from the command line.
//!
//! Thin client over the workspace services: loads a circuit snapshot,
//! compiles it, invokes a solver, and renders or persists the result. No
//! solver internals are touched beyond the published request/response
//! types.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use vstab_algo::{AcSolver, ContinuationSolver, CpfOptions, CpfTrace};
use vstab_compile::{compile, CompileOptions, NumericalCircuit};
use vstab_core::{CircuitSnapshot, Diagnostics};
use vstab_results::RunStore;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting tracing subscriber")?;

    match cli.command {
        Commands::Pf { grid, q_limits, json } => run_pf(&grid, q_limits, json),
        Commands::Cpf {
            grid,
            load_scale,
            gen_scale,
            parametrization,
            stop_at,
            step,
            fixed_step,
            q_limits,
            distributed_slack,
            output,
            store,
        } => run_cpf(CpfArgs {
            grid,
            load_scale,
            gen_scale,
            parametrization,
            stop_at,
            step,
            fixed_step,
            q_limits,
            distributed_slack,
            output,
            store,
        }),
        Commands::Runs { store } => {
            let store = RunStore::open(&store)?;
            for run in store.list()? {
                println!("{}  {}  {}", run.run_id, run.kind, run.path);
            }
            Ok(())
        }
    }
}

fn load_circuit(grid: &Path) -> Result<NumericalCircuit> {
    let text = fs::read_to_string(grid)
        .with_context(|| format!("reading snapshot {}", grid.display()))?;
    let snapshot = CircuitSnapshot::from_json(&text)?;
    let base_mva = snapshot.base_mva;
    let network = snapshot.into_network()?;

    let mut diag = Diagnostics::new();
    network.validate_into(&mut diag);
    for issue in diag.iter() {
        warn!("{}", issue);
    }
    if diag.has_errors() {
        bail!("snapshot failed validation with {} errors", diag.error_count());
    }

    let options = CompileOptions {
        base_mva,
        ..CompileOptions::default()
    };
    let mut diag = Diagnostics::new();
    let circ = compile(&network, &options, &mut diag)?;
    for issue in diag.iter() {
        warn!("{}", issue);
    }
    info!(
        "compiled {} buses, {} branches at {} MVA base",
        circ.n_bus, circ.n_branch, circ.sbase
    );
    Ok(circ)
}

fn run_pf(grid: &Path, q_limits: bool, json: bool) -> Result<()> {
    let circ = load_circuit(grid)?;
    let solver = AcSolver::new().with_q_limit_enforcement(q_limits);
    let solution = solver.solve(&circ)?;

    if json {
        let rows: Vec<serde_json::Value> = (0..circ.n_bus)
            .map(|i| {
                serde_json::json!({
                    "bus": circ.bus_ids[i].value(),
                    "vm_pu": solution.v[i].norm(),
                    "va_deg": solution.v[i].arg().to_degrees(),
                    "p_pu": solution.scalc[i].re,
                    "q_pu": solution.scalc[i].im,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        println!("bus      vm [pu]    va [deg]      P [pu]      Q [pu]");
        for i in 0..circ.n_bus {
            println!(
                "{:<6} {:>9.4} {:>11.4} {:>11.4} {:>11.4}",
                circ.bus_ids[i].value(),
                solution.v[i].norm(),
                solution.v[i].arg().to_degrees(),
                solution.scalc[i].re,
                solution.scalc[i].im,
            );
        }
    }
    info!(
        "converged in {} iterations, max mismatch {:.3e}",
        solution.iterations, solution.max_mismatch
    );
    Ok(())
}

struct CpfArgs {
    grid: std::path::PathBuf,
    load_scale: f64,
    gen_scale: f64,
    parametrization: String,
    stop_at: String,
    step: f64,
    fixed_step: bool,
    q_limits: bool,
    distributed_slack: bool,
    output: Option<std::path::PathBuf>,
    store: Option<std::path::PathBuf>,
}

fn run_cpf(args: CpfArgs) -> Result<()> {
    let mut circ = load_circuit(&args.grid)?;

    // Solve the base case first: the continuation starts from a point on
    // the manifold, not from a flat guess.
    let base_solution = AcSolver::new().solve(&circ).context("solving base case")?;
    circ.v0 = base_solution.v.clone();
    info!(
        "base case solved in {} iterations",
        base_solution.iterations
    );

    let options = CpfOptions {
        step: args.step,
        adapt_step: !args.fixed_step,
        parametrization: args.parametrization.parse()?,
        stop_at: args.stop_at.parse()?,
        control_q: args.q_limits,
        distributed_slack: args.distributed_slack,
        ..CpfOptions::default()
    };
    let solver = ContinuationSolver::new(options)?;

    let base = circ.sbus();
    let target = circ.scaled_injections(args.gen_scale, args.load_scale);

    let mut diag = Diagnostics::new();
    let mut accepted = 0usize;
    let trace = solver.run_with_observer(&circ, &base, &target, &mut diag, &mut |step| {
        accepted += 1;
        info!("step {:>4}: λ = {:.6}", accepted, step.lam);
    })?;
    for issue in diag.iter() {
        warn!("{}", issue);
    }

    let summary = trace.summary();
    println!(
        "steps: {}   λ_max: {:.4}   margin: {:.4}",
        summary.steps, summary.max_loading, summary.loading_margin
    );
    if let Some(bus) = summary.critical_bus {
        println!(
            "critical bus: {} (|V| = {:.4} pu at λ_max)",
            circ.bus_ids[bus].value(),
            trace
                .steps
                .iter()
                .max_by(|a, b| a.lam.total_cmp(&b.lam))
                .map(|s| s.v[bus].norm())
                .unwrap_or(f64::NAN)
        );
    }

    if let Some(path) = &args.output {
        write_nose_curve_csv(path, &circ, &trace)?;
        info!("nose curve written to {}", path.display());
    }

    if let Some(root) = &args.store {
        let store = RunStore::open(root)?;
        let run_id = store.store("cpf", &trace)?;
        println!("stored as run {}", run_id);
    }

    Ok(())
}

/// One CSV row per accepted step: λ, residual, then |V| per bus.
fn write_nose_curve_csv(path: &Path, circ: &NumericalCircuit, trace: &CpfTrace) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["step".to_string(), "lambda".to_string(), "norm_f".to_string()];
    for id in &circ.bus_ids {
        header.push(format!("vm_{}", id.value()));
    }
    writer.write_record(&header)?;

    for (k, step) in trace.steps.iter().enumerate() {
        let mut row = vec![
            k.to_string(),
            format!("{:.8}", step.lam),
            format!("{:.3e}", step.norm_f),
        ];
        for v in &step.v {
            row.push(format!("{:.6}", v.norm()));
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
