//! # In-Memory Ledger
//!
//! A process-local [`LedgerGateway`] that enforces the same contract-level
//! rules as the deployed contracts: status transitions, signer/threshold
//! consistency, idempotent audit appends. Used by tests, the CLI `simulate`
//! command and local development.
//!
//! ## Fault injection
//!
//! Writes consume scripted [`Fault`]s from a queue. A fault may be scoped to
//! one contract so that, for example, only audit appends fail. Reads can be
//! made to fail a fixed number of times with [`InMemoryLedger::fail_reads`].
//!
//! All state sits behind one `parking_lot::Mutex`, never held across an
//! await point.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use kyc_core::{
    Clock, EventId, JurisdictionCode, SignerId, SubjectAddress, VerificationRecord,
    VerificationStatus,
};

use crate::contract::ContractId;
use crate::error::LedgerError;
use crate::gateway::LedgerGateway;
use crate::operation::{AuditEntry, JurisdictionRuleSet, LedgerOperation, LedgerQuery, LedgerValue};
use crate::receipt::Receipt;

/// A scripted write failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Node unavailable; nothing applied.
    Unreachable,
    /// Contract rejects the call with this reason; nothing applied.
    Revert(String),
    /// Transaction lands but confirmation is not observed.
    TimeoutApplied,
    /// Confirmation is not observed and the transaction is dropped.
    TimeoutDropped,
}

#[derive(Debug)]
struct ScriptedFault {
    contract: Option<ContractId>,
    fault: Fault,
}

#[derive(Debug)]
struct LedgerState {
    records: HashMap<SubjectAddress, VerificationRecord>,
    audit: Vec<AuditEntry>,
    audit_ids: HashSet<EventId>,
    rules: HashMap<JurisdictionCode, JurisdictionRuleSet>,
    signers: Vec<SignerId>,
    threshold: u8,
    block: u64,
    faults: VecDeque<ScriptedFault>,
    read_failures: u32,
    write_latency: Duration,
    write_attempts: u64,
    accepted: Vec<LedgerOperation>,
}

/// In-memory stand-in for the deployed contracts.
///
/// Cloning shares the underlying state.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLedger {
    /// Empty ledger: no records, no signers, threshold 1.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState {
                records: HashMap::new(),
                audit: Vec::new(),
                audit_ids: HashSet::new(),
                rules: HashMap::new(),
                signers: Vec::new(),
                threshold: 1,
                block: 0,
                faults: VecDeque::new(),
                read_failures: 0,
                write_latency: Duration::ZERO,
                write_attempts: 0,
                accepted: Vec::new(),
            })),
            clock,
        }
    }

    /// Seed the multisig manager. Seeding bypasses contract checks and does
    /// not count as a write.
    pub fn with_signers(self, signers: Vec<SignerId>, threshold: u8) -> Self {
        {
            let mut st = self.state.lock();
            st.signers = signers;
            st.threshold = threshold;
        }
        self
    }

    /// Seed a jurisdiction rule set.
    pub fn with_rules(self, rules: JurisdictionRuleSet) -> Self {
        self.state.lock().rules.insert(rules.jurisdiction.clone(), rules);
        self
    }

    /// Seed a verification record.
    pub fn with_record(self, record: VerificationRecord) -> Self {
        self.state.lock().records.insert(record.subject.clone(), record);
        self
    }

    /// Queue a fault for the next matching write on any contract.
    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(ScriptedFault {
            contract: None,
            fault,
        });
    }

    /// Queue a fault for the next write to `contract`.
    pub fn inject_for(&self, contract: ContractId, fault: Fault) {
        self.state.lock().faults.push_back(ScriptedFault {
            contract: Some(contract),
            fault,
        });
    }

    /// Make the next `n` reads fail as unreachable.
    pub fn fail_reads(&self, n: u32) {
        self.state.lock().read_failures = n;
    }

    /// Delay every write by `latency` before it is applied.
    pub fn set_write_latency(&self, latency: Duration) {
        self.state.lock().write_latency = latency;
    }

    /// Current record for `subject`.
    pub fn record(&self, subject: &SubjectAddress) -> Option<VerificationRecord> {
        self.state.lock().records.get(subject).cloned()
    }

    /// Current signer set.
    pub fn signers(&self) -> Vec<SignerId> {
        self.state.lock().signers.clone()
    }

    /// Current threshold.
    pub fn threshold(&self) -> u8 {
        self.state.lock().threshold
    }

    /// Audit entries in append order.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().audit.clone()
    }

    /// Every write call received, including failed ones.
    pub fn write_attempts(&self) -> u64 {
        self.state.lock().write_attempts
    }

    /// Writes the contracts accepted, in order.
    pub fn write_log(&self) -> Vec<LedgerOperation> {
        self.state.lock().accepted.clone()
    }

    /// Number of writes the contracts accepted.
    pub fn applied_writes(&self) -> usize {
        self.state.lock().accepted.len()
    }

    /// Accepted writes sent to `contract`.
    pub fn writes_to(&self, contract: ContractId) -> usize {
        self.state
            .lock()
            .accepted
            .iter()
            .filter(|op| op.contract() == contract)
            .count()
    }

    fn take_fault(st: &mut LedgerState, contract: ContractId) -> Option<Fault> {
        let idx = st
            .faults
            .iter()
            .position(|f| f.contract.map_or(true, |c| c == contract))?;
        st.faults.remove(idx).map(|f| f.fault)
    }

    fn receipt(st: &mut LedgerState, contract: ContractId, clock: &dyn Clock) -> Receipt {
        st.block += 1;
        Receipt {
            contract,
            tx_hash: format!("0x{:064x}", st.block),
            block_number: st.block,
            confirmed_at: clock.now(),
        }
    }

    /// Apply `op` under the contract rules.
    fn apply(&self, st: &mut LedgerState, op: &LedgerOperation) -> Result<(), LedgerError> {
        let contract = op.contract();
        let revert = |reason: String| LedgerError::Reverted { contract, reason };
        let now = self.clock.now();

        match op {
            LedgerOperation::StoreKycData {
                subject,
                user_id,
                content_hash,
                risk_score,
                jurisdiction,
            } => {
                if st
                    .records
                    .get(subject)
                    .is_some_and(|r| r.status == VerificationStatus::Approved)
                {
                    return Err(revert("subject already approved".into()));
                }
                st.records.insert(
                    subject.clone(),
                    VerificationRecord {
                        subject: subject.clone(),
                        user_id: user_id.clone(),
                        content_hash: content_hash.clone(),
                        risk_score: *risk_score,
                        jurisdiction: jurisdiction.clone(),
                        status: VerificationStatus::Pending,
                        updated_at: now,
                    },
                );
            }
            LedgerOperation::UpdateKycStatus { subject, status } => {
                let record = st
                    .records
                    .get_mut(subject)
                    .ok_or_else(|| revert("subject not registered".into()))?;
                if record.status == status.status() {
                    return Ok(());
                }
                if !status.allowed_from(record.status) {
                    return Err(revert(format!(
                        "invalid status transition {} -> {}",
                        record.status, status
                    )));
                }
                record.status = status.status();
                record.updated_at = now;
            }
            LedgerOperation::UpdateRiskScore {
                subject,
                risk_score,
            } => {
                let record = st
                    .records
                    .get_mut(subject)
                    .ok_or_else(|| revert("subject not registered".into()))?;
                record.risk_score = *risk_score;
                record.updated_at = now;
            }
            LedgerOperation::AppendAuditEntry(entry) => {
                if st.audit_ids.insert(entry.event_id) {
                    st.audit.push(entry.clone());
                }
            }
            LedgerOperation::SetJurisdictionRules(rules) => {
                st.rules.insert(rules.jurisdiction.clone(), rules.clone());
            }
            LedgerOperation::AddSigner { signer } => {
                if st.signers.contains(signer) {
                    return Err(revert("already a signer".into()));
                }
                st.signers.push(signer.clone());
            }
            LedgerOperation::RemoveSigner { signer } => {
                if !st.signers.contains(signer) {
                    return Err(revert("not a signer".into()));
                }
                if st.signers.len() <= usize::from(st.threshold) {
                    return Err(revert("signer count would drop below threshold".into()));
                }
                st.signers.retain(|s| s != signer);
            }
            LedgerOperation::SetThreshold { threshold } => {
                if usize::from(threshold.get()) > st.signers.len() {
                    return Err(revert("threshold exceeds signer count".into()));
                }
                st.threshold = threshold.get();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn read(&self, query: &LedgerQuery) -> Result<LedgerValue, LedgerError> {
        let mut st = self.state.lock();
        if st.read_failures > 0 {
            st.read_failures -= 1;
            return Err(LedgerError::Unreachable {
                contract: query.contract(),
                reason: "injected read failure".into(),
            });
        }
        Ok(match query {
            LedgerQuery::GetVerification { subject } => {
                LedgerValue::Verification(st.records.get(subject).cloned())
            }
            LedgerQuery::AuditEntryExists { event_id } => {
                LedgerValue::Flag(st.audit_ids.contains(event_id))
            }
            LedgerQuery::GetJurisdictionRules { jurisdiction } => {
                LedgerValue::Rules(st.rules.get(jurisdiction).cloned())
            }
            LedgerQuery::GetSigners => LedgerValue::Signers(st.signers.clone()),
            LedgerQuery::GetThreshold => LedgerValue::Threshold(st.threshold),
        })
    }

    async fn write(&self, operation: &LedgerOperation) -> Result<Receipt, LedgerError> {
        let latency = {
            let mut st = self.state.lock();
            st.write_attempts += 1;
            st.write_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let contract = operation.contract();
        let mut st = self.state.lock();
        match Self::take_fault(&mut st, contract) {
            Some(Fault::Unreachable) => Err(LedgerError::Unreachable {
                contract,
                reason: "injected: node unavailable".into(),
            }),
            Some(Fault::Revert(reason)) => Err(LedgerError::Reverted { contract, reason }),
            Some(Fault::TimeoutDropped) => {
                let receipt = Self::receipt(&mut st, contract, self.clock.as_ref());
                Err(LedgerError::Timeout {
                    contract,
                    tx_hash: Some(receipt.tx_hash),
                })
            }
            Some(Fault::TimeoutApplied) => {
                self.apply(&mut st, operation)?;
                st.accepted.push(operation.clone());
                let receipt = Self::receipt(&mut st, contract, self.clock.as_ref());
                Err(LedgerError::Timeout {
                    contract,
                    tx_hash: Some(receipt.tx_hash),
                })
            }
            None => {
                self.apply(&mut st, operation)?;
                st.accepted.push(operation.clone());
                Ok(Self::receipt(&mut st, contract, self.clock.as_ref()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::DecisionStatus;
    use kyc_core::{ContentHash, ManualClock, RiskScore, UserId};

    fn subject() -> SubjectAddress {
        SubjectAddress::new("0x0000000000000000000000000000000000000abc").unwrap()
    }

    fn signer(n: u8) -> SignerId {
        SignerId::new(&format!("0x{:040x}", n)).unwrap()
    }

    fn store() -> LedgerOperation {
        LedgerOperation::StoreKycData {
            subject: subject(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(25).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
        }
    }

    fn status(s: DecisionStatus) -> LedgerOperation {
        LedgerOperation::UpdateKycStatus {
            subject: subject(),
            status: s,
        }
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(Arc::new(ManualClock::default()))
    }

    #[tokio::test]
    async fn store_then_approve() {
        let l = ledger();
        l.write(&store()).await.unwrap();
        assert_eq!(l.record(&subject()).unwrap().status, VerificationStatus::Pending);
        let r = l.write(&status(DecisionStatus::Approved)).await.unwrap();
        assert_eq!(r.block_number, 2);
        assert!(l.record(&subject()).unwrap().is_active());
    }

    #[tokio::test]
    async fn status_update_on_unknown_subject_reverts() {
        let l = ledger();
        let err = l.write(&status(DecisionStatus::Approved)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::Reverted {
                contract: ContractId::DataStorage,
                reason: "subject not registered".into()
            }
        );
        assert_eq!(l.applied_writes(), 0);
    }

    #[tokio::test]
    async fn repeated_status_update_is_a_noop() {
        let l = ledger();
        l.write(&store()).await.unwrap();
        l.write(&status(DecisionStatus::Approved)).await.unwrap();
        let before = l.record(&subject()).unwrap();
        l.write(&status(DecisionStatus::Approved)).await.unwrap();
        assert_eq!(l.record(&subject()).unwrap(), before);
    }

    #[tokio::test]
    async fn invalid_transition_reverts() {
        let l = ledger();
        l.write(&store()).await.unwrap();
        let err = l.write(&status(DecisionStatus::Revoked)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { .. }));
    }

    #[tokio::test]
    async fn restore_after_approval_reverts() {
        let l = ledger();
        l.write(&store()).await.unwrap();
        l.write(&status(DecisionStatus::Approved)).await.unwrap();
        assert!(l.write(&store()).await.is_err());
    }

    #[tokio::test]
    async fn timeout_applied_lands_but_reports_timeout() {
        let l = ledger();
        l.inject(Fault::TimeoutApplied);
        let err = l.write(&store()).await.unwrap_err();
        assert!(err.is_ambiguous());
        assert!(l.is_applied(&store()).await.unwrap());
    }

    #[tokio::test]
    async fn timeout_dropped_leaves_no_trace() {
        let l = ledger();
        l.inject(Fault::TimeoutDropped);
        assert!(l.write(&store()).await.unwrap_err().is_ambiguous());
        assert!(!l.is_applied(&store()).await.unwrap());
        assert_eq!(l.applied_writes(), 0);
    }

    #[tokio::test]
    async fn scoped_fault_skips_other_contracts() {
        let l = ledger();
        l.inject_for(ContractId::AuditLog, Fault::Unreachable);
        l.write(&store()).await.unwrap();
        let entry = AuditEntry {
            event_id: EventId::new(),
            actor: [0u8; 20],
            subject: subject(),
            action: kyc_core::ActionKind::KycSubmitted,
            prior_state: None,
            outcome: kyc_core::ActionOutcome::Applied,
        };
        let op = LedgerOperation::AppendAuditEntry(entry);
        assert!(l.write(&op).await.unwrap_err().is_retryable());
        l.write(&op).await.unwrap();
        l.write(&op).await.unwrap();
        assert_eq!(l.audit_entries().len(), 1);
    }

    #[tokio::test]
    async fn signer_and_threshold_consistency() {
        let l = ledger().with_signers(vec![signer(1), signer(2)], 2);
        let err = l
            .write(&LedgerOperation::RemoveSigner { signer: signer(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Reverted { .. }));
        let three = std::num::NonZeroU8::new(3).unwrap();
        assert!(l
            .write(&LedgerOperation::SetThreshold { threshold: three })
            .await
            .is_err());
        l.write(&LedgerOperation::AddSigner { signer: signer(3) })
            .await
            .unwrap();
        l.write(&LedgerOperation::SetThreshold { threshold: three })
            .await
            .unwrap();
        assert_eq!(l.threshold(), 3);
    }

    #[tokio::test]
    async fn injected_read_failures_are_consumed() {
        let l = ledger();
        l.fail_reads(1);
        assert!(l.read(&LedgerQuery::GetThreshold).await.is_err());
        assert_eq!(
            l.read(&LedgerQuery::GetThreshold).await.unwrap(),
            LedgerValue::Threshold(1)
        );
    }
}
