//! Lamport Ledger CLI
//!
//! Run one simulated group of processes and print what it recorded.
//!
//! # Example
//!
//! ```bash
//! # Bank run: three workers, robbery plan
//! lamport-ledger -p 3 10 20 30
//!
//! # Seeded random transfers, snapshot as JSON
//! lamport-ledger -p 4 50 50 50 50 --plan random --transfers 20 --seed 7 --json
//!
//! # Mutex workload with critical sections
//! lamport-ledger -p 3 --mutexl
//!
//! # Everything from a config file, narrative log to a file
//! lamport-ledger --config run.json --events-log events.log
//! ```

use clap::{Parser, ValueEnum};
use lamport_ledger_core::{
    render_table, run_simulation, Balance, SimulationConfig, SimulationError, SimulationOutcome,
    TransferPlan, Workload,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WorkloadKind {
    Basic,
    Bank,
    Mutex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlanKind {
    Robbery,
    Random,
    Idle,
}

/// Lamport Ledger
///
/// Runs a coordinator and N workers that talk only over point-to-point
/// channels and order their actions with logical clocks.
#[derive(Parser, Debug)]
#[command(name = "lamport-ledger")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of worker processes
    #[arg(short = 'p', long = "processes")]
    processes: Option<usize>,

    /// Opening balance of each worker, worker 1 first
    #[arg(allow_negative_numbers = true)]
    balances: Vec<Balance>,

    /// Wrap each mutex-workload iteration in a critical section
    #[arg(long)]
    mutexl: bool,

    /// Workload to run. Inferred from the other flags when omitted.
    #[arg(long, value_enum)]
    workload: Option<WorkloadKind>,

    /// Transfer plan of a bank run
    #[arg(long, value_enum, default_value = "robbery")]
    plan: PlanKind,

    /// Number of random transfers
    #[arg(long, default_value = "10")]
    transfers: usize,

    /// Largest random transfer amount
    #[arg(long, default_value = "5")]
    max_amount: Balance,

    /// Seed of the random plan
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Load the whole configuration from a JSON file instead
    #[arg(long, conflicts_with_all = ["processes", "balances", "mutexl", "workload"])]
    config: Option<PathBuf>,

    /// Write the merged narrative event log to this file
    #[arg(long)]
    events_log: Option<PathBuf>,

    /// Print the snapshot as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

impl Args {
    fn workload_kind(&self) -> WorkloadKind {
        match self.workload {
            Some(kind) => kind,
            None if self.mutexl => WorkloadKind::Mutex,
            None if !self.balances.is_empty() => WorkloadKind::Bank,
            None => WorkloadKind::Basic,
        }
    }

    fn plan(&self) -> TransferPlan {
        match self.plan {
            PlanKind::Robbery => TransferPlan::Robbery,
            PlanKind::Random => TransferPlan::Random {
                transfers: self.transfers,
                max_amount: self.max_amount,
                seed: self.seed,
            },
            PlanKind::Idle => TransferPlan::Idle,
        }
    }

    fn to_config(&self) -> Result<SimulationConfig, CliError> {
        if let Some(path) = &self.config {
            let json = fs::read_to_string(path).map_err(|source| CliError::Io {
                path: path.clone(),
                source,
            })?;
            return Ok(SimulationConfig::from_json(&json)?);
        }

        let kind = self.workload_kind();
        let workers = match (self.processes, kind) {
            (Some(n), _) => n,
            (None, WorkloadKind::Bank) => self.balances.len(),
            (None, _) => {
                return Err(CliError::Usage(
                    "-p <N> is required unless balances or --config are given".to_string(),
                ))
            }
        };

        let workload = match kind {
            WorkloadKind::Basic => Workload::Basic { workers },
            WorkloadKind::Mutex => Workload::Mutex {
                workers,
                use_mutex: self.mutexl,
            },
            WorkloadKind::Bank => {
                if self.balances.len() != workers {
                    return Err(CliError::Usage(format!(
                        "{} workers need {} opening balances, got {}",
                        workers,
                        workers,
                        self.balances.len()
                    )));
                }
                Workload::Bank {
                    initial_balances: self.balances.clone(),
                    plan: self.plan(),
                }
            }
        };
        Ok(SimulationConfig::new(workload))
    }
}

fn write_events_log(path: &PathBuf, outcome: &SimulationOutcome) -> Result<(), CliError> {
    let mut text = String::new();
    for event in outcome.timeline() {
        text.push_str(&event.to_string());
        text.push('\n');
    }
    fs::write(path, text).map_err(|source| CliError::Io {
        path: path.clone(),
        source,
    })
}

fn run(args: &Args) -> Result<(), CliError> {
    let config = args.to_config()?;
    let outcome = run_simulation(&config)?;
    info!(
        run_id = %outcome.run_id,
        processes = outcome.reports.len(),
        "run complete"
    );

    if let Some(path) = &args.events_log {
        write_events_log(path, &outcome)?;
    }

    match &outcome.snapshot {
        Some(snapshot) if args.json => println!("{}", snapshot.to_json()?),
        Some(snapshot) => print!("{}", render_table(snapshot)),
        None => {
            for section in outcome.critical_sections() {
                println!(
                    "process {} held the critical section over [{};{}]",
                    section.id, section.entered, section.released
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,lamport_ledger_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("lamport-ledger: {}", e);
            ExitCode::FAILURE
        }
    }
}
