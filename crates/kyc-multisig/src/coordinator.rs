//! # Multisig Coordinator
//!
//! Owns every proposal and drives it through its state machine.
//!
//! ## Serialization
//!
//! Each proposal sits behind its own async mutex, held across the signer
//! directory read and the execution write. Two signatures that would each
//! cross the threshold are therefore applied one after the other, and the
//! second finds the proposal already executed. Proposals do not contend
//! with each other: the proposal table lock is synchronous and never held
//! across an await.
//!
//! ## Execution
//!
//! Reaching the quorum issues exactly one ledger write:
//!
//! | Write outcome | Proposal | Caller sees |
//! |---------------|----------|-------------|
//! | confirmed     | `Executed`, audit event recorded | `SignOutcome::Executed` |
//! | timed out     | `Pending` + in-flight marker | `SignOutcome::ExecutionPending` |
//! | reverted      | `Failed`, never retried | `MultisigError::ExecutionReverted` |
//! | not sent      | `Pending` with quorum | `MultisigError::ExecutionNotApplied` |
//!
//! The last two non-terminal cases are settled by
//! [`MultisigCoordinator::resolve_execution`], which re-reads the ledger
//! before it re-issues anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use kyc_audit::{AuditError, AuditEvent, AuditRecorder, WriteProof};
use kyc_core::{Clock, ContentDigest, EventId, ProposalId, SignerId, Timestamp};
use kyc_ledger::{LedgerError, LedgerGateway, LedgerQuery, Receipt, WriteOutcome};

use crate::directory::{SignerDirectory, SignerSnapshot};
use crate::error::{MultisigError, SignerError};
use crate::proposal::{MultisigProposal, PrivilegedOperation, ProposalStatus, SignatureProgress};

/// Coordinator settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Lifetime of a proposal that has not reached quorum.
    pub proposal_ttl: chrono::Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            proposal_ttl: chrono::Duration::hours(24),
        }
    }
}

/// Result of an accepted signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SignOutcome {
    /// Still below threshold.
    Pending {
        /// Valid signatures so far.
        collected: usize,
        /// Required signatures.
        threshold: u8,
    },
    /// The operation is on the ledger.
    Executed {
        /// Receipt, when confirmation was observed directly.
        receipt: Option<Receipt>,
        /// Transaction hash of the execution, if known.
        tx_hash: Option<String>,
        /// Audit event for the execution.
        audit_event: Option<EventId>,
        /// Whether the audit append failed and awaits repair.
        audit_gap: bool,
    },
    /// The execution write was submitted but not confirmed in time.
    ExecutionPending {
        /// Transaction hash, if the node acknowledged submission.
        tx_hash: Option<String>,
    },
}

impl SignOutcome {
    /// Whether the operation is known to be on the ledger.
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed { .. })
    }
}

/// Result of [`MultisigCoordinator::propose`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposeOutcome {
    /// Proposal the request was filed under.
    pub proposal_id: ProposalId,
    /// Whether an open proposal for the same operation was joined.
    pub joined: bool,
    /// Effect of the proposer's signature.
    pub outcome: SignOutcome,
}

#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    id: ProposalId,
    expires_at: Timestamp,
    /// Quorum reached; the entry stays until the proposal is terminal.
    executing: bool,
}

type ProposalHandle = Arc<tokio::sync::Mutex<MultisigProposal>>;

/// Proposal, signature collection, execution and expiry of privileged
/// ledger operations.
#[derive(Debug)]
pub struct MultisigCoordinator {
    gateway: Arc<dyn LedgerGateway>,
    directory: Arc<dyn SignerDirectory>,
    audit: AuditRecorder,
    clock: Arc<dyn Clock>,
    config: CoordinatorConfig,
    proposals: RwLock<HashMap<ProposalId, ProposalHandle>>,
    /// Non-terminal proposals offered to repeat requests, keyed by operation.
    open: Mutex<HashMap<String, OpenEntry>>,
}

impl MultisigCoordinator {
    /// Create a coordinator. `directory` is read on every signature.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        directory: Arc<dyn SignerDirectory>,
        audit: AuditRecorder,
        clock: Arc<dyn Clock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            gateway,
            directory,
            audit,
            clock,
            config,
            proposals: RwLock::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Request `operation` on behalf of `proposer` and add their signature.
    ///
    /// If a proposal for the same operation is still open it is joined
    /// instead of duplicated. Joining one whose quorum was already reached
    /// settles its execution rather than adding a signature.
    pub async fn propose(
        &self,
        operation: PrivilegedOperation,
        proposer: &SignerId,
    ) -> Result<ProposeOutcome, MultisigError> {
        let snapshot = self.snapshot().await?;
        check_snapshot(&snapshot)?;
        if !snapshot.authorizes(proposer) {
            return Err(SignerError::InvalidSigner(proposer.clone()).into());
        }

        let (proposal_id, joined) = self.open_or_join(operation, proposer, snapshot.threshold);
        let outcome = match self.sign(proposal_id, proposer).await {
            Err(MultisigError::Signer(SignerError::QuorumAlreadyReached(_))) if joined => {
                tracing::info!(%proposal_id, "joined proposal awaiting execution");
                self.resolve_execution(proposal_id).await?
            }
            other => other?,
        };
        Ok(ProposeOutcome {
            proposal_id,
            joined,
            outcome,
        })
    }

    fn open_or_join(
        &self,
        operation: PrivilegedOperation,
        proposer: &SignerId,
        threshold: u8,
    ) -> (ProposalId, bool) {
        let now = self.clock.now();
        let key = dedupe_key(&operation);
        let mut open = self.open.lock();
        if let Some(entry) = key.as_ref().and_then(|k| open.get(k)) {
            if entry.executing || now <= entry.expires_at {
                tracing::debug!(proposal_id = %entry.id, "joining open proposal");
                return (entry.id, true);
            }
        }

        let proposal =
            MultisigProposal::new(operation, proposer.clone(), threshold, now, self.config.proposal_ttl);
        let id = proposal.id;
        let expires_at = proposal.expires_at;
        tracing::info!(
            proposal_id = %id,
            operation = proposal.operation.operation().function_name(),
            proposer = %proposer,
            threshold,
            %expires_at,
            "proposal opened"
        );
        self.proposals
            .write()
            .insert(id, Arc::new(tokio::sync::Mutex::new(proposal)));
        if let Some(key) = key {
            open.insert(
                key,
                OpenEntry {
                    id,
                    expires_at,
                    executing: false,
                },
            );
        }
        metrics::counter!("kyc_multisig_proposals_opened_total").increment(1);
        (id, false)
    }

    /// Add `signer`'s signature to proposal `id`, executing on quorum.
    pub async fn sign(&self, id: ProposalId, signer: &SignerId) -> Result<SignOutcome, MultisigError> {
        let handle = self.handle(&id)?;
        let mut proposal = handle.lock().await;
        let snapshot = self.snapshot().await?;
        let now = self.clock.now();

        match proposal.add_signature(signer, &snapshot.signers, snapshot.threshold, now) {
            Ok(SignatureProgress::Collecting {
                collected,
                threshold,
            }) => {
                tracing::info!(proposal_id = %id, %signer, collected, threshold, "signature collected");
                Ok(SignOutcome::Pending {
                    collected,
                    threshold,
                })
            }
            Ok(SignatureProgress::QuorumReached) => {
                tracing::info!(
                    proposal_id = %id,
                    %signer,
                    signatures = proposal.signatures.len(),
                    threshold = proposal.threshold,
                    "quorum reached"
                );
                self.mark_executing(&proposal);
                self.execute(&mut proposal).await
            }
            Err(e) => {
                if proposal.status == ProposalStatus::Expired {
                    self.closed(&proposal);
                }
                tracing::debug!(proposal_id = %id, %signer, error = %e, "signature refused");
                Err(e.into())
            }
        }
    }

    /// Veto proposal `id`. Only possible before quorum.
    pub async fn reject(&self, id: ProposalId, signer: &SignerId) -> Result<(), MultisigError> {
        let handle = self.handle(&id)?;
        let mut proposal = handle.lock().await;
        let snapshot = self.snapshot().await?;
        let now = self.clock.now();

        let result = proposal.reject(signer, &snapshot.signers, snapshot.threshold, now);
        if proposal.status.is_terminal() {
            self.closed(&proposal);
        }
        result.map_err(MultisigError::from)
    }

    /// Expire every overdue proposal without quorum. Returns the ids that
    /// transitioned.
    pub async fn expire_due(&self) -> Vec<ProposalId> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for handle in self.handles() {
            let mut proposal = handle.lock().await;
            if proposal.expire_if_due(now) {
                self.closed(&proposal);
                expired.push(proposal.id);
            }
        }
        expired
    }

    /// Settle a proposal whose quorum was reached but whose execution was
    /// not confirmed.
    ///
    /// The ledger is read first. A write found applied completes the
    /// proposal without another write; otherwise the write is re-issued
    /// once.
    pub async fn resolve_execution(&self, id: ProposalId) -> Result<SignOutcome, MultisigError> {
        let handle = self.handle(&id)?;
        let mut proposal = handle.lock().await;
        if proposal.status.is_terminal() {
            return Err(SignerError::ProposalAlreadyTerminal {
                proposal: id,
                status: proposal.status,
            }
            .into());
        }
        if !proposal.has_quorum() {
            return Ok(SignOutcome::Pending {
                collected: proposal.signatures.len(),
                threshold: proposal.threshold,
            });
        }

        let op = proposal.operation.operation().clone();
        match self.gateway.is_applied(&op).await {
            Ok(true) => {
                let tx_hash = proposal.in_flight.as_ref().and_then(|f| f.tx_hash.clone());
                let prior = proposal.in_flight.as_ref().and_then(|f| f.prior_state);
                tracing::info!(proposal_id = %id, tx_hash = ?tx_hash, "execution found applied");
                let proof = WriteProof::Reconciled {
                    contract: op.contract(),
                    tx_hash: tx_hash.clone(),
                };
                Ok(self.complete(&mut proposal, proof, None, tx_hash, prior).await)
            }
            Ok(false) => {
                tracing::info!(proposal_id = %id, "execution not applied, re-issuing");
                self.execute(&mut proposal).await
            }
            Err(e) => {
                tracing::warn!(proposal_id = %id, error = %e, "execution state unreadable");
                Ok(SignOutcome::ExecutionPending {
                    tx_hash: proposal.execution_tx.clone(),
                })
            }
        }
    }

    /// Snapshot of proposal `id`.
    pub async fn get(&self, id: ProposalId) -> Option<MultisigProposal> {
        let handle = self.proposals.read().get(&id).cloned()?;
        let proposal = handle.lock().await;
        Some(proposal.clone())
    }

    /// Every non-terminal proposal, oldest first.
    pub async fn pending_proposals(&self) -> Vec<MultisigProposal> {
        let mut pending = Vec::new();
        for handle in self.handles() {
            let proposal = handle.lock().await;
            if !proposal.status.is_terminal() {
                pending.push(proposal.clone());
            }
        }
        pending.sort_by_key(|p| p.created_at);
        pending
    }

    /// Pending proposals whose quorum was reached but whose execution is
    /// unconfirmed.
    pub async fn unresolved_executions(&self) -> Vec<ProposalId> {
        self.pending_proposals()
            .await
            .into_iter()
            .filter(MultisigProposal::has_quorum)
            .map(|p| p.id)
            .collect()
    }

    async fn execute(&self, proposal: &mut MultisigProposal) -> Result<SignOutcome, MultisigError> {
        let op = proposal.operation.operation().clone();
        let prior = self.prior_state(proposal).await;

        match self.gateway.submit(&op).await {
            WriteOutcome::Confirmed(receipt) => {
                let proof = WriteProof::from(receipt.clone());
                let tx_hash = Some(receipt.tx_hash.clone());
                Ok(self.complete(proposal, proof, Some(receipt), tx_hash, prior).await)
            }
            WriteOutcome::Ambiguous { tx_hash, .. } => {
                tracing::warn!(
                    proposal_id = %proposal.id,
                    tx_hash = ?tx_hash,
                    "execution unconfirmed, awaiting resolution"
                );
                proposal.mark_in_flight(tx_hash.clone(), prior, self.clock.now());
                Ok(SignOutcome::ExecutionPending { tx_hash })
            }
            WriteOutcome::Failed(LedgerError::Reverted { reason, .. }) => {
                tracing::error!(proposal_id = %proposal.id, %reason, "execution reverted");
                proposal.mark_failed(reason.clone(), self.clock.now());
                self.closed(proposal);
                Err(MultisigError::ExecutionReverted {
                    proposal: proposal.id,
                    reason,
                })
            }
            WriteOutcome::Failed(source) => {
                tracing::warn!(proposal_id = %proposal.id, error = %source, "execution not applied");
                proposal.mark_not_applied();
                Err(MultisigError::ExecutionNotApplied {
                    proposal: proposal.id,
                    source,
                })
            }
        }
    }

    async fn complete(
        &self,
        proposal: &mut MultisigProposal,
        proof: WriteProof,
        receipt: Option<Receipt>,
        tx_hash: Option<String>,
        prior: Option<ContentDigest>,
    ) -> SignOutcome {
        let now = self.clock.now();
        proposal.mark_executed(receipt.clone(), tx_hash.clone(), now);
        self.closed(proposal);

        let Some(action) = proposal.operation.operation().action() else {
            return SignOutcome::Executed {
                receipt,
                tx_hash,
                audit_event: None,
                audit_gap: false,
            };
        };
        let event = AuditEvent::new(
            proposal.quorum_actor(),
            proposal.operation.audit_subject(),
            action,
            proof,
            now,
        )
        .with_prior_state(prior)
        .with_metadata(serde_json::json!({
            "proposal_id": proposal.id.as_uuid().to_string(),
            "threshold": proposal.threshold,
            "signers": proposal.signers().iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        }));

        let (audit_event, audit_gap) = match self.audit.record(event).await {
            Ok(id) => (Some(id), false),
            Err(AuditError::Gap { event_id, .. }) => (Some(event_id), true),
            Err(AuditError::Duplicate(id)) => (Some(id), false),
        };
        SignOutcome::Executed {
            receipt,
            tx_hash,
            audit_event,
            audit_gap,
        }
    }

    /// Digest of the subject's record before a status decision executes.
    async fn prior_state(&self, proposal: &MultisigProposal) -> Option<ContentDigest> {
        let subject = proposal.operation.subject()?.clone();
        let record = match self
            .gateway
            .read(&LedgerQuery::GetVerification { subject })
            .await
            .and_then(|v| v.into_verification())
        {
            Ok(record) => record?,
            Err(e) => {
                tracing::debug!(proposal_id = %proposal.id, error = %e, "prior state unavailable");
                return None;
            }
        };
        record.digest().ok()
    }

    async fn snapshot(&self) -> Result<SignerSnapshot, MultisigError> {
        self.directory
            .snapshot()
            .await
            .map_err(MultisigError::DirectoryUnavailable)
    }

    fn handle(&self, id: &ProposalId) -> Result<ProposalHandle, SignerError> {
        self.proposals
            .read()
            .get(id)
            .cloned()
            .ok_or(SignerError::UnknownProposal(*id))
    }

    fn handles(&self) -> Vec<ProposalHandle> {
        self.proposals.read().values().cloned().collect()
    }

    fn mark_executing(&self, proposal: &MultisigProposal) {
        if let Some(key) = dedupe_key(&proposal.operation) {
            if let Some(entry) = self.open.lock().get_mut(&key) {
                if entry.id == proposal.id {
                    entry.executing = true;
                }
            }
        }
    }

    /// Stop offering `proposal` to new requests for the same operation.
    fn release(&self, proposal: &MultisigProposal) {
        if let Some(key) = dedupe_key(&proposal.operation) {
            let mut open = self.open.lock();
            if open.get(&key).map(|e| e.id) == Some(proposal.id) {
                open.remove(&key);
            }
        }
    }

    fn closed(&self, proposal: &MultisigProposal) {
        self.release(proposal);
        metrics::counter!("kyc_multisig_proposals_closed_total", "status" => proposal.status.as_str())
            .increment(1);
        tracing::info!(
            proposal_id = %proposal.id,
            status = %proposal.status,
            reason = proposal.terminal_reason.as_deref().unwrap_or(""),
            "proposal closed"
        );
    }
}

fn check_snapshot(snapshot: &SignerSnapshot) -> Result<(), SignerError> {
    if snapshot.threshold == 0 || usize::from(snapshot.threshold) > snapshot.signers.len() {
        return Err(SignerError::InvalidThreshold {
            threshold: snapshot.threshold,
            signers: snapshot.signers.len(),
        });
    }
    Ok(())
}

fn dedupe_key(operation: &PrivilegedOperation) -> Option<String> {
    serde_json::to_string(operation.operation()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::LedgerSignerDirectory;
    use kyc_core::{
        ActionKind, Actor, ContentHash, JurisdictionCode, ManualClock, RiskScore, SubjectAddress,
        UserId, VerificationRecord, VerificationStatus,
    };
    use kyc_ledger::{ContractId, DecisionStatus, Fault, InMemoryLedger, LedgerOperation};

    fn signer(n: u8) -> SignerId {
        SignerId::new(&format!("0x{:040x}", n)).unwrap()
    }

    fn subject() -> SubjectAddress {
        SubjectAddress::new("0x0000000000000000000000000000000000000abc").unwrap()
    }

    fn pending_record(now: Timestamp) -> VerificationRecord {
        VerificationRecord {
            subject: subject(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(20).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            status: VerificationStatus::Pending,
            updated_at: now,
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        ledger: InMemoryLedger,
        audit: AuditRecorder,
        coordinator: MultisigCoordinator,
    }

    fn fixture(threshold: u8) -> Fixture {
        let t0 = Timestamp::from_unix_secs(1_768_478_400).unwrap();
        let clock = Arc::new(ManualClock::new(t0));
        let ledger = InMemoryLedger::new(clock.clone())
            .with_signers(vec![signer(1), signer(2), signer(3)], threshold)
            .with_record(pending_record(t0));
        let gateway: Arc<dyn LedgerGateway> = Arc::new(ledger.clone());
        let audit = AuditRecorder::new(gateway.clone());
        let coordinator = MultisigCoordinator::new(
            gateway.clone(),
            Arc::new(LedgerSignerDirectory::new(gateway)),
            audit.clone(),
            clock.clone(),
            CoordinatorConfig::default(),
        );
        Fixture {
            clock,
            ledger,
            audit,
            coordinator,
        }
    }

    fn approve() -> PrivilegedOperation {
        PrivilegedOperation::decide(subject(), DecisionStatus::Approved)
    }

    fn status_writes(ledger: &InMemoryLedger) -> usize {
        ledger
            .write_log()
            .iter()
            .filter(|op| matches!(op, LedgerOperation::UpdateKycStatus { .. }))
            .count()
    }

    #[tokio::test]
    async fn two_of_three_executes_once_and_refuses_late_signer() {
        let f = fixture(2);
        let proposed = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        assert!(!proposed.joined);
        assert_eq!(
            proposed.outcome,
            SignOutcome::Pending {
                collected: 1,
                threshold: 2
            }
        );
        assert_eq!(status_writes(&f.ledger), 0);

        let outcome = f.coordinator.sign(proposed.proposal_id, &signer(2)).await.unwrap();
        assert!(outcome.is_executed());
        assert_eq!(status_writes(&f.ledger), 1);
        assert_eq!(f.ledger.record(&subject()).unwrap().status, VerificationStatus::Approved);

        let late = f.coordinator.sign(proposed.proposal_id, &signer(3)).await;
        assert!(matches!(
            late,
            Err(MultisigError::Signer(SignerError::ProposalAlreadyTerminal {
                status: ProposalStatus::Executed,
                ..
            }))
        ));
        assert_eq!(status_writes(&f.ledger), 1);
    }

    #[tokio::test]
    async fn execution_is_audited_with_quorum_and_prior_state() {
        let f = fixture(2);
        let before = f.ledger.record(&subject()).unwrap().digest().unwrap();
        let proposed = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        let outcome = f.coordinator.sign(proposed.proposal_id, &signer(3)).await.unwrap();
        let SignOutcome::Executed {
            audit_event: Some(event_id),
            audit_gap: false,
            ..
        } = outcome
        else {
            panic!("expected audited execution, got {outcome:?}");
        };

        let events: Vec<_> = f.audit.query(&subject(), 10, Default::default()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, event_id);
        assert_eq!(events[0].action, ActionKind::KycApproved);
        assert_eq!(events[0].prior_state, Some(before));
        assert_eq!(
            events[0].actor,
            Actor::Quorum {
                signers: vec![signer(1), signer(3)]
            }
        );
    }

    #[tokio::test]
    async fn duplicate_and_outsider_signatures_do_not_mutate() {
        let f = fixture(3);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        let before = f.coordinator.get(id).await.unwrap();

        assert!(matches!(
            f.coordinator.sign(id, &signer(1)).await,
            Err(MultisigError::Signer(SignerError::DuplicateSignature { .. }))
        ));
        assert!(matches!(
            f.coordinator.sign(id, &signer(7)).await,
            Err(MultisigError::Signer(SignerError::InvalidSigner(_)))
        ));
        assert_eq!(f.coordinator.get(id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn outsider_cannot_propose() {
        let f = fixture(2);
        let result = f.coordinator.propose(approve(), &signer(9)).await;
        assert!(matches!(
            result,
            Err(MultisigError::Signer(SignerError::InvalidSigner(_)))
        ));
        assert!(f.coordinator.pending_proposals().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_threshold_crossing_executes_once() {
        let f = fixture(2);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        f.ledger.set_write_latency(std::time::Duration::from_millis(20));

        let (s2, s3) = (signer(2), signer(3));
        let (b, c) = tokio::join!(f.coordinator.sign(id, &s2), f.coordinator.sign(id, &s3));
        let executed = [&b, &c]
            .iter()
            .filter(|r| matches!(r, Ok(o) if o.is_executed()))
            .count();
        assert_eq!(executed, 1);
        assert_eq!(status_writes(&f.ledger), 1);
    }

    #[tokio::test]
    async fn late_signature_after_expiry_is_refused() {
        let f = fixture(2);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        f.clock.advance(chrono::Duration::hours(25));

        let late = f.coordinator.sign(id, &signer(2)).await;
        assert_eq!(late, Err(MultisigError::Signer(SignerError::ProposalExpired(id))));
        assert_eq!(f.coordinator.get(id).await.unwrap().status, ProposalStatus::Expired);
        assert_eq!(status_writes(&f.ledger), 0);
    }

    #[tokio::test]
    async fn expire_due_sweeps_overdue_proposals() {
        let f = fixture(3);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        assert!(f.coordinator.expire_due().await.is_empty());

        f.clock.advance(chrono::Duration::hours(25));
        assert_eq!(f.coordinator.expire_due().await, vec![id]);
        assert!(f.coordinator.pending_proposals().await.is_empty());
    }

    #[tokio::test]
    async fn same_operation_joins_open_proposal() {
        let f = fixture(2);
        let first = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        let second = f.coordinator.propose(approve(), &signer(2)).await.unwrap();
        assert!(second.joined);
        assert_eq!(first.proposal_id, second.proposal_id);
        assert!(second.outcome.is_executed());

        let rejection = PrivilegedOperation::decide(subject(), DecisionStatus::Rejected);
        let third = f.coordinator.propose(rejection, &signer(3)).await.unwrap();
        assert!(!third.joined);
    }

    #[tokio::test]
    async fn rejection_closes_the_proposal() {
        let f = fixture(2);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        f.coordinator.reject(id, &signer(3)).await.unwrap();
        let p = f.coordinator.get(id).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Rejected);

        let reopened = f.coordinator.propose(approve(), &signer(2)).await.unwrap();
        assert_ne!(reopened.proposal_id, id);
    }

    #[tokio::test]
    async fn revert_fails_the_proposal_without_retry() {
        let f = fixture(1);
        f.ledger
            .inject_for(ContractId::DataStorage, Fault::Revert("sender lacks role".into()));
        let result = f.coordinator.propose(approve(), &signer(1)).await;
        let Err(MultisigError::ExecutionReverted { proposal, reason }) = result else {
            panic!("expected revert, got {result:?}");
        };
        assert_eq!(reason, "sender lacks role");
        let p = f.coordinator.get(proposal).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Failed);
        assert!(matches!(
            f.coordinator.resolve_execution(proposal).await,
            Err(MultisigError::Signer(SignerError::ProposalAlreadyTerminal { .. }))
        ));
        assert_eq!(f.ledger.record(&subject()).unwrap().status, VerificationStatus::Pending);
    }

    #[tokio::test]
    async fn timed_out_execution_resolves_without_second_write() {
        let f = fixture(1);
        f.ledger.inject_for(ContractId::DataStorage, Fault::TimeoutApplied);
        let proposed = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        assert!(matches!(proposed.outcome, SignOutcome::ExecutionPending { tx_hash: Some(_) }));
        assert_eq!(
            f.coordinator.unresolved_executions().await,
            vec![proposed.proposal_id]
        );

        let resolved = f.coordinator.resolve_execution(proposed.proposal_id).await.unwrap();
        assert!(resolved.is_executed());
        assert_eq!(status_writes(&f.ledger), 1);

        let events: Vec<_> = f.audit.query(&subject(), 10, Default::default()).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].proof, WriteProof::Reconciled { .. }));
        assert!(events[0].prior_state.is_some());
    }

    #[tokio::test]
    async fn dropped_execution_is_reissued_once() {
        let f = fixture(1);
        f.ledger.inject_for(ContractId::DataStorage, Fault::TimeoutDropped);
        let proposed = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        assert!(matches!(proposed.outcome, SignOutcome::ExecutionPending { .. }));
        assert_eq!(status_writes(&f.ledger), 0);

        let resolved = f.coordinator.resolve_execution(proposed.proposal_id).await.unwrap();
        assert!(resolved.is_executed());
        assert_eq!(status_writes(&f.ledger), 1);
    }

    #[tokio::test]
    async fn request_during_unconfirmed_execution_joins_and_settles_it() {
        let f = fixture(1);
        f.ledger.inject_for(ContractId::DataStorage, Fault::TimeoutDropped);
        let first = f.coordinator.propose(approve(), &signer(1)).await.unwrap();
        assert!(matches!(first.outcome, SignOutcome::ExecutionPending { .. }));

        // Past the proposal's expiry: quorum was reached, so it is still joined.
        f.clock.advance(chrono::Duration::hours(25));
        let second = f.coordinator.propose(approve(), &signer(2)).await.unwrap();
        assert!(second.joined);
        assert_eq!(second.proposal_id, first.proposal_id);
        assert!(second.outcome.is_executed());
        assert_eq!(status_writes(&f.ledger), 1);

        assert!(f.coordinator.unresolved_executions().await.is_empty());
        let approvals = f
            .audit
            .query(&subject(), 10, Default::default())
            .filter(|e| e.action == ActionKind::KycApproved)
            .count();
        assert_eq!(approvals, 1);

        // Executed: no longer offered to new requests.
        assert!(f.coordinator.open.lock().is_empty());
    }

    #[tokio::test]
    async fn unreachable_execution_keeps_quorum() {
        let f = fixture(1);
        f.ledger.inject_for(ContractId::DataStorage, Fault::Unreachable);
        let result = f.coordinator.propose(approve(), &signer(1)).await;
        assert!(matches!(result, Err(MultisigError::ExecutionNotApplied { .. })));

        let pending = f.coordinator.pending_proposals().await;
        assert_eq!(pending.len(), 1);
        assert!(pending[0].has_quorum());
        assert_eq!(pending[0].execution_attempts, 1);

        let resolved = f.coordinator.resolve_execution(pending[0].id).await.unwrap();
        assert!(resolved.is_executed());
    }

    #[tokio::test]
    async fn directory_outage_has_no_side_effect() {
        let f = fixture(2);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        f.ledger.fail_reads(1);
        assert!(matches!(
            f.coordinator.sign(id, &signer(2)).await,
            Err(MultisigError::DirectoryUnavailable(_))
        ));
        assert_eq!(f.coordinator.get(id).await.unwrap().signatures.len(), 1);
    }

    #[tokio::test]
    async fn removed_signer_signature_stops_counting() {
        let f = fixture(2);
        let id = f.coordinator.propose(approve(), &signer(1)).await.unwrap().proposal_id;
        f.ledger
            .write(&LedgerOperation::RemoveSigner { signer: signer(1) })
            .await
            .unwrap();

        let outcome = f.coordinator.sign(id, &signer(2)).await.unwrap();
        assert_eq!(
            outcome,
            SignOutcome::Pending {
                collected: 1,
                threshold: 2
            }
        );
        assert_eq!(status_writes(&f.ledger), 0);
    }

    #[tokio::test]
    async fn signer_changes_execute_through_quorum() {
        let f = fixture(2);
        let id = f
            .coordinator
            .propose(PrivilegedOperation::add_signer(signer(4)), &signer(2))
            .await
            .unwrap()
            .proposal_id;
        f.coordinator.sign(id, &signer(3)).await.unwrap();
        assert!(f.ledger.signers().contains(&signer(4)));

        let events: Vec<_> = f
            .audit
            .query(&SubjectAddress::from(signer(4)), 10, Default::default())
            .collect();
        assert_eq!(events[0].action, ActionKind::SignerAdded);
    }

    #[tokio::test]
    async fn unknown_proposal_is_refused() {
        let f = fixture(2);
        let id = ProposalId::new();
        assert_eq!(
            f.coordinator.sign(id, &signer(1)).await,
            Err(MultisigError::Signer(SignerError::UnknownProposal(id)))
        );
    }
}
