//! # simulate
//!
//! Runs the administrative flow against an in-memory ledger: submission,
//! multisig approval, a late signature after execution, a status read and
//! a compliance check. Each step is printed as one JSON object.
//!
//! ```bash
//! kycctl simulate --threshold 2
//! kycctl simulate --submit-timeout   # exercise reconciliation
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};

use kyc_core::{
    JurisdictionCode, ManualClock, ProposalId, RiskScore, SignerId, SubjectAddress, Timestamp,
};
use kyc_ledger::{ContractId, Fault, InMemoryLedger, JurisdictionRuleSet};
use kyc_reconcile::{
    InMemoryMirror, KycSubmission, OperationOutcome, ReconciliationService, ServiceError,
};

use crate::config::KycConfig;

const SIGNERS: u8 = 3;
const SAMPLE_CONTENT_HASH: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

/// Arguments for `kycctl simulate`.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Subject wallet address.
    #[arg(long, default_value = "0x0000000000000000000000000000000000000abc")]
    pub subject: String,
    /// Jurisdiction to register the subject under.
    #[arg(long, default_value = "PK")]
    pub jurisdiction: String,
    /// Initial risk score.
    #[arg(long, default_value_t = 20)]
    pub risk_score: u32,
    /// Signatures required out of three signers.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub threshold: u8,
    /// Make the submission's confirmation time out after it lands.
    #[arg(long)]
    pub submit_timeout: bool,
}

/// One printed step.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStep {
    /// Step name.
    pub step: String,
    /// Outcome, or error code and disposition.
    pub result: Value,
}

/// Execute `simulate`.
pub async fn run_simulate(args: &SimulateArgs, config: &KycConfig) -> Result<u8> {
    for step in simulate(args, config).await? {
        println!("{}", serde_json::to_string(&step)?);
    }
    Ok(0)
}

/// Run the flow and collect its steps.
pub async fn simulate(args: &SimulateArgs, config: &KycConfig) -> Result<Vec<SimulationStep>> {
    let subject = SubjectAddress::new(&args.subject)?;
    let jurisdiction = JurisdictionCode::new(&args.jurisdiction)?;
    let signers = (1..=SIGNERS)
        .map(|n| SignerId::new(&format!("0x{:040x}", n)))
        .collect::<Result<Vec<_>, _>>()?;

    let clock = Arc::new(ManualClock::new(Timestamp::now()));
    let ledger = InMemoryLedger::new(clock.clone())
        .with_signers(signers.clone(), args.threshold)
        .with_rules(JurisdictionRuleSet {
            jurisdiction: jurisdiction.clone(),
            max_risk_score: RiskScore::new(50)?,
            requires_documents: true,
            requires_active: true,
            max_record_age_days: Some(365),
        });
    let service = ReconciliationService::new(
        Arc::new(ledger.clone()),
        Arc::new(InMemoryMirror::new()),
        clock,
        config.service.clone(),
    );

    let mut steps = Vec::new();
    let mut push = |step: &str, result: Value| {
        tracing::debug!(step, "simulation step");
        steps.push(SimulationStep {
            step: step.to_string(),
            result,
        });
    };

    if args.submit_timeout {
        ledger.inject_for(ContractId::DataStorage, Fault::TimeoutApplied);
    }
    let submission = KycSubmission::new(
        subject.as_str(),
        "simulated-user",
        SAMPLE_CONTENT_HASH,
        args.risk_score,
        jurisdiction.as_str(),
    )?;
    let submitted = service.submit_kyc(submission).await;
    let ambiguous = matches!(submitted, Ok(OperationOutcome::Ambiguous { .. }));
    push("submit", outcome_json(&submitted)?);
    if ambiguous {
        let report = service.reconcile_stale().await?;
        push("reconcile", serde_json::to_value(report)?);
    }

    let approved = service.approve(&subject, &signers[0]).await;
    push("approve", outcome_json(&approved)?);
    let proposal = open_proposal(&approved);
    let mut last = approved;
    let mut next = 1;
    while let Some(id) = open_proposal(&last) {
        let Some(signer) = signers.get(next) else { break };
        last = service.sign(id, signer).await;
        push("sign", outcome_json(&last)?);
        next += 1;
    }
    if let (Some(id), Some(late)) = (proposal, signers.get(next)) {
        let late_result = service.sign(id, late).await;
        push("late_signature", outcome_json(&late_result)?);
    }

    push("status", serde_json::to_value(service.get_status(&subject).await?)?);
    let compliance = service.get_compliance(&subject, jurisdiction.as_str()).await;
    push(
        "compliance",
        match compliance {
            Ok(result) => serde_json::to_value(result)?,
            Err(e) => error_json(&e),
        },
    );
    push("statistics", serde_json::to_value(service.statistics().await)?);
    Ok(steps)
}

/// Proposal still collecting signatures after `outcome`.
fn open_proposal(outcome: &Result<OperationOutcome, ServiceError>) -> Option<ProposalId> {
    match outcome {
        Ok(OperationOutcome::AwaitingSignatures { proposal_id, .. }) => Some(*proposal_id),
        _ => None,
    }
}

fn outcome_json(result: &Result<OperationOutcome, ServiceError>) -> Result<Value> {
    Ok(match result {
        Ok(outcome) => serde_json::to_value(outcome)?,
        Err(e) => error_json(e),
    })
}

fn error_json(e: &ServiceError) -> Value {
    json!({
        "error": e.code(),
        "disposition": e.disposition(),
        "message": e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> SimulateArgs {
        SimulateArgs {
            subject: "0x0000000000000000000000000000000000000abc".into(),
            jurisdiction: "PK".into(),
            risk_score: 20,
            threshold: 2,
            submit_timeout: false,
        }
    }

    fn step<'a>(steps: &'a [SimulationStep], name: &str) -> &'a Value {
        &steps
            .iter()
            .find(|s| s.step == name)
            .unwrap_or_else(|| panic!("missing step {name}"))
            .result
    }

    #[tokio::test]
    async fn two_of_three_flow_rejects_late_signer() {
        let steps = simulate(&args(), &KycConfig::default()).await.unwrap();
        assert_eq!(step(&steps, "approve")["outcome"], "awaiting_signatures");
        assert_eq!(step(&steps, "sign")["outcome"], "confirmed");
        assert_eq!(step(&steps, "late_signature")["error"], "proposal_already_terminal");
        assert_eq!(step(&steps, "status")["record"]["status"], "APPROVED");
        assert_eq!(step(&steps, "compliance")["passed"], true);
        assert_eq!(step(&steps, "statistics")["approvals"], 1);
    }

    #[tokio::test]
    async fn submit_timeout_is_reconciled() {
        let steps = simulate(
            &SimulateArgs {
                submit_timeout: true,
                ..args()
            },
            &KycConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(step(&steps, "submit")["outcome"], "ambiguous");
        assert_eq!(step(&steps, "reconcile")["writes_confirmed"], 1);
        assert_eq!(step(&steps, "status")["record"]["status"], "APPROVED");
    }

    #[tokio::test]
    async fn single_signer_threshold_executes_on_proposal() {
        let steps = simulate(
            &SimulateArgs {
                threshold: 1,
                ..args()
            },
            &KycConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(step(&steps, "approve")["outcome"], "confirmed");
        assert!(steps.iter().all(|s| s.step != "late_signature"));
    }
}
