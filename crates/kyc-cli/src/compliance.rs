//! # compliance
//!
//! Evaluates a subject's ledger record against a jurisdiction's current
//! rule set. Exit code 0 when the subject passes, 3 when it does not.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use kyc_compliance::ComplianceEvaluator;
use kyc_core::{SubjectAddress, SystemClock};
use kyc_ledger::{LedgerQuery, LedgerValue};

use crate::config::KycConfig;

/// Arguments for `kycctl compliance`.
#[derive(Args, Debug)]
pub struct ComplianceArgs {
    /// Subject wallet address.
    pub subject: String,
    /// Jurisdiction code to evaluate against.
    #[arg(long, short)]
    pub jurisdiction: String,
}

/// Execute `compliance`.
pub async fn run_compliance(args: &ComplianceArgs, config: &KycConfig) -> Result<u8> {
    let subject = SubjectAddress::new(&args.subject)?;
    let gateway = config.gateway()?;
    let record = gateway
        .read(&LedgerQuery::GetVerification {
            subject: subject.clone(),
        })
        .await
        .and_then(LedgerValue::into_verification)
        .with_context(|| format!("failed to read verification for {subject}"))?
        .with_context(|| format!("{subject} has no verification record"))?;

    let evaluator = ComplianceEvaluator::new(gateway, Arc::new(SystemClock));
    let result = evaluator
        .evaluate(&record, &args.jurisdiction)
        .await
        .context("failed to read jurisdiction rules")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(if result.passed { 0 } else { 3 })
}
