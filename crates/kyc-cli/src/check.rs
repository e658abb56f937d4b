//! # check-config
//!
//! Loads the configuration the other subcommands would use and prints it
//! with the RPC endpoint redacted.

use anyhow::Result;
use clap::Args;

use crate::config::KycConfig;

/// Arguments for `kycctl check-config`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Fail unless a ledger is configured.
    #[arg(long)]
    pub require_ledger: bool,
}

/// Execute `check-config`.
pub fn run_check(args: &CheckArgs, config: &KycConfig) -> Result<u8> {
    match &config.ledger {
        Some(ledger) => println!("ledger:  {ledger:#?}"),
        None if args.require_ledger => {
            config.ledger()?;
        }
        None => println!("ledger:  not configured (simulate only)"),
    }
    println!("service: {:#?}", config.service);
    println!();
    println!("configuration OK");
    Ok(0)
}
