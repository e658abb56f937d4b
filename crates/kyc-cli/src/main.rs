//! # kycctl entry point
//!
//! Parses command-line arguments, initializes logging and dispatches to the
//! subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kyc_cli::check::{run_check, CheckArgs};
use kyc_cli::compliance::{run_compliance, ComplianceArgs};
use kyc_cli::config::KycConfig;
use kyc_cli::ledger::{run_signers, run_status, StatusArgs};
use kyc_cli::simulate::{run_simulate, SimulateArgs};

/// KYC ledger sync operator CLI.
#[derive(Parser, Debug)]
#[command(name = "kycctl", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and print the effective configuration.
    CheckConfig(CheckArgs),
    /// Read a subject's verification record from the ledger.
    Status(StatusArgs),
    /// Read the authorized signer set and threshold.
    Signers,
    /// Evaluate a subject against a jurisdiction's rules.
    Compliance(ComplianceArgs),
    /// Run the administrative flow against an in-memory ledger.
    Simulate(SimulateArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = match KycConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::from(1);
        }
    };

    let result = match &cli.command {
        Commands::CheckConfig(args) => run_check(args, &config),
        Commands::Status(args) => run_status(args, &config).await,
        Commands::Signers => run_signers(&config).await,
        Commands::Compliance(args) => run_compliance(args, &config).await,
        Commands::Simulate(args) => run_simulate(args, &config).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
