//! Shared fixture: an in-memory ledger with three signers and PK rules,
//! wired into a reconciliation service.

#![allow(dead_code)]

use std::sync::Arc;

use kyc_core::{JurisdictionCode, ManualClock, RiskScore, SignerId, SubjectAddress, Timestamp};
use kyc_ledger::{InMemoryLedger, JurisdictionRuleSet, RetryPolicy};
use kyc_reconcile::{InMemoryMirror, KycSubmission, ReconciliationService, ServiceConfig};

pub const SUBJECT_ABC: &str = "0x0000000000000000000000000000000000000abc";
pub const CONTENT_HASH: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
pub const T0: i64 = 1_768_478_400;

pub struct Stack {
    pub ledger: InMemoryLedger,
    pub mirror: Arc<InMemoryMirror>,
    pub clock: Arc<ManualClock>,
    pub service: Arc<ReconciliationService>,
}

pub fn signer(n: u8) -> SignerId {
    SignerId::new(&format!("0x{:040x}", n)).unwrap()
}

pub fn subject(n: u16) -> SubjectAddress {
    SubjectAddress::new(&format!("0x{:040x}", n)).unwrap()
}

pub fn abc() -> SubjectAddress {
    SubjectAddress::new(SUBJECT_ABC).unwrap()
}

pub fn submission(subject: &SubjectAddress, risk_score: u32) -> KycSubmission {
    KycSubmission::new(subject.as_str(), "user-1", CONTENT_HASH, risk_score, "PK").unwrap()
}

pub fn pk_rules() -> JurisdictionRuleSet {
    JurisdictionRuleSet {
        jurisdiction: JurisdictionCode::new("PK").unwrap(),
        max_risk_score: RiskScore::new(50).unwrap(),
        requires_documents: true,
        requires_active: true,
        max_record_age_days: Some(365),
    }
}

/// Three signers, `threshold` of them required.
pub fn stack(threshold: u8) -> Stack {
    stack_with(threshold, ServiceConfig {
        retry: RetryPolicy::none(),
        ..ServiceConfig::default()
    })
}

pub fn stack_with(threshold: u8, config: ServiceConfig) -> Stack {
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(T0).unwrap()));
    let ledger = InMemoryLedger::new(clock.clone())
        .with_signers(vec![signer(1), signer(2), signer(3)], threshold)
        .with_rules(pk_rules());
    let mirror = Arc::new(InMemoryMirror::new());
    let service = Arc::new(ReconciliationService::new(
        Arc::new(ledger.clone()),
        mirror.clone(),
        clock.clone(),
        config,
    ));
    Stack {
        ledger,
        mirror,
        clock,
        service,
    }
}
