use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use mtpcut_algo::{build_scenario, CutPlaneEngine};
use mtpcut_core::MtpError;
use mtpcut_io::{load_case, CutplaneConfig};
use tracing::{error, info};

mod cli;
mod logging;

use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.logfile) {
        eprintln!("mtpcut: {e:#}");
        return ExitCode::FAILURE;
    }

    info!("mtpcut v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(stage = failure_stage(&e), "fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!(config = %cli.config.display(), "reading configuration");
    let config = CutplaneConfig::from_file(&cli.config)
        .map_err(MtpError::from)
        .with_context(|| format!("configuration '{}'", cli.config.display()))?;

    let network = load_case(&config.case_file)?;
    info!(
        case = %config.case_name,
        periods = config.periods,
        policy = %config.policy.name(),
        families = ?config.enabled_families(),
        "case loaded"
    );

    let scenario = build_scenario(&network, &config)?;
    let mut engine = CutPlaneEngine::new(&config, &network, &scenario, &cli.sols_dir)?;
    let outcome = engine.run()?;

    let report = &outcome.report;
    match report.final_objective {
        Some(objective) => info!(
            "{}: {} after {} rounds, objective {:.6}",
            report.case, report.status, report.rounds, objective
        ),
        None => info!("{}: {} before any round solved", report.case, report.status),
    }
    Ok(())
}

/// Configuration, case and scenario errors stop the run before any round.
fn failure_stage(err: &anyhow::Error) -> &'static str {
    match err.chain().find_map(|e| e.downcast_ref::<MtpError>()) {
        Some(e) if e.is_fatal_at_start() => "startup",
        _ => "run",
    }
}
