//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Voltage-stability analysis toolkit", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot AC power flow (Newton-Raphson)
    Pf {
        /// Path to the circuit snapshot (JSON)
        #[arg(long)]
        grid: PathBuf,
        /// Enforce generator reactive limits (PV-PQ switching)
        #[arg(long)]
        q_limits: bool,
        /// Print the solution as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Continuation power flow: trace the nose curve
    Cpf {
        /// Path to the circuit snapshot (JSON)
        #[arg(long)]
        grid: PathBuf,
        /// Load scaling of the target case relative to the base
        #[arg(long, default_value_t = 2.0)]
        load_scale: f64,
        /// Generation scaling of the target case relative to the base
        #[arg(long, default_value_t = 1.0)]
        gen_scale: f64,
        /// Parametrization: natural, arc-length or pseudo-arc-length
        #[arg(long, default_value = "arc-length")]
        parametrization: String,
        /// Stop policy: nose, full or extra-overloads
        #[arg(long, default_value = "nose")]
        stop_at: String,
        /// Initial continuation step length
        #[arg(long, default_value_t = 0.05)]
        step: f64,
        /// Disable adaptive step control
        #[arg(long)]
        fixed_step: bool,
        /// Enforce generator reactive limits during the trace
        #[arg(long)]
        q_limits: bool,
        /// Redistribute slack power by installed capacity
        #[arg(long)]
        distributed_slack: bool,
        /// Write the nose curve to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Persist the full trace into this run store directory
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// List runs persisted in a run store
    Runs {
        /// Run store directory
        #[arg(long)]
        store: PathBuf,
    },
}
