//! # Concurrent Callers
//!
//! Same-subject operations serialize; different subjects do not wait on
//! each other.

mod common;

use std::time::{Duration, Instant};

use common::{abc, signer, stack, subject, submission};
use kyc_ledger::LedgerOperation;
use kyc_reconcile::OperationOutcome;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_produce_one_write_and_one_noop() {
    let s = stack(1);
    s.service.submit_kyc(submission(&abc(), 20)).await.unwrap();
    s.ledger.set_write_latency(Duration::from_millis(20));

    let a = {
        let service = s.service.clone();
        tokio::spawn(async move { service.approve(&abc(), &signer(1)).await })
    };
    let b = {
        let service = s.service.clone();
        tokio::spawn(async move { service.approve(&abc(), &signer(2)).await })
    };
    let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

    let confirmed = outcomes
        .iter()
        .filter(|o| matches!(o, OperationOutcome::Confirmed { .. }))
        .count();
    let noops = outcomes
        .iter()
        .filter(|o| matches!(o, OperationOutcome::NoOp { .. }))
        .count();
    assert_eq!((confirmed, noops), (1, 1));

    let status_writes = s
        .ledger
        .write_log()
        .iter()
        .filter(|op| matches!(op, LedgerOperation::UpdateKycStatus { .. }))
        .count();
    assert_eq!(status_writes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approve_and_reject_never_both_apply() {
    let s = stack(1);
    s.service.submit_kyc(submission(&abc(), 20)).await.unwrap();
    s.ledger.set_write_latency(Duration::from_millis(20));

    let approve = {
        let service = s.service.clone();
        tokio::spawn(async move { service.approve(&abc(), &signer(1)).await })
    };
    let reject = {
        let service = s.service.clone();
        tokio::spawn(async move { service.reject(&abc(), &signer(2)).await })
    };
    let results = [approve.await.unwrap(), reject.await.unwrap()];

    // One decision lands; the other is refused as an invalid transition.
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let refused = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(refused.code(), "invalid_transition");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_subjects_proceed_in_parallel() {
    const LATENCY: Duration = Duration::from_millis(150);
    let s = stack(1);
    s.ledger.set_write_latency(LATENCY);

    let started = Instant::now();
    let tasks: Vec<_> = (1..=4u16)
        .map(|n| {
            let service = s.service.clone();
            tokio::spawn(async move { service.submit_kyc(submission(&subject(0x100 + n), 20)).await })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    let elapsed = started.elapsed();

    // Each submission is a data write plus an audit append. Serialized,
    // four subjects would take at least eight write latencies.
    assert!(elapsed < LATENCY * 6, "took {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_risk_updates_for_one_subject_are_serialized() {
    let s = stack(1);
    s.service.submit_kyc(submission(&abc(), 20)).await.unwrap();
    s.ledger.set_write_latency(Duration::from_millis(10));

    let tasks: Vec<_> = [30u32, 40, 50]
        .into_iter()
        .map(|score| {
            let service = s.service.clone();
            tokio::spawn(async move {
                service
                    .update_risk_score(&abc(), kyc_core::RiskScore::new(score).unwrap())
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_settled());
    }

    // The mirror matches whichever update landed last.
    let ledger_score = s.ledger.record(&abc()).unwrap().risk_score;
    let mirrored = s.service.get_status(&abc()).await.unwrap().record.unwrap();
    assert_eq!(mirrored.risk_score, ledger_score);
}
