//! # Ledger reads
//!
//! `kycctl status <subject>` and `kycctl signers` read the deployed
//! contracts directly. Nothing is written.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use kyc_core::SubjectAddress;
use kyc_ledger::{LedgerQuery, LedgerValue};

use crate::config::KycConfig;

/// Arguments for `kycctl status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Subject wallet address.
    pub subject: String,
}

/// Execute `status`.
pub async fn run_status(args: &StatusArgs, config: &KycConfig) -> Result<u8> {
    let subject = SubjectAddress::new(&args.subject)?;
    let gateway = config.gateway()?;
    let record = gateway
        .read(&LedgerQuery::GetVerification {
            subject: subject.clone(),
        })
        .await
        .and_then(LedgerValue::into_verification)
        .with_context(|| format!("failed to read verification for {subject}"))?;

    match record {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(0)
        }
        None => {
            eprintln!("{subject} has no verification record");
            Ok(2)
        }
    }
}

/// Execute `signers`.
pub async fn run_signers(config: &KycConfig) -> Result<u8> {
    let gateway = config.gateway()?;
    let signers = gateway
        .read(&LedgerQuery::GetSigners)
        .await
        .and_then(LedgerValue::into_signers)
        .context("failed to read signer set")?;
    let threshold = gateway
        .read(&LedgerQuery::GetThreshold)
        .await
        .and_then(LedgerValue::into_threshold)
        .context("failed to read threshold")?;

    let out = json!({
        "threshold": threshold,
        "signers": signers,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(0)
}
