//! # Reconciliation Service
//!
//! One entry point per logical operation. Each entry point:
//!
//! 1. takes validated inputs (construction of the typed arguments is the
//!    request-shape check);
//! 2. serializes on the subject;
//! 3. routes privileged operations through the multisig coordinator and
//!    writes the rest directly;
//! 4. on confirmation refreshes the mirror from the ledger and records the
//!    audit event;
//! 5. on failure leaves the mirror untouched and returns the failure.
//!
//! An unconfirmed write marks the mirror stale and is settled later by
//! [`ReconciliationService::reconcile_stale`] or a status read. The ledger
//! is read before anything is re-issued.

use std::sync::Arc;

use kyc_audit::{AuditError, AuditEvent, AuditFilter, AuditQuery, AuditRecorder, WriteProof};
use kyc_compliance::{ComplianceEvaluator, ComplianceResult};
use kyc_core::{
    Actor, Clock, ContentDigest, ContentHash, EventId, JurisdictionCode, ProposalId, RiskScore,
    SignerId, SubjectAddress, UserId, ValidationError, VerificationRecord,
};
use kyc_ledger::{
    DecisionStatus, GuardedGateway, LedgerGateway, LedgerOperation, LedgerQuery, LedgerValue,
    WriteOutcome,
};
use kyc_multisig::{
    LedgerSignerDirectory, MultisigCoordinator, MultisigError, MultisigProposal,
    PrivilegedOperation, SignOutcome, SignerError,
};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::locks::SubjectLocks;
use crate::mirror::{MirrorEntry, MirrorState, MirrorStore, PendingWrite};
use crate::outcome::{
    OperationOutcome, ReconcileReport, ServiceStatistics, StatusSource, StatusView, SweepReport,
};
use crate::risk::{RiskBatchReport, RiskBatchSummary, RiskUpdateStatus, ScoreResult};

/// A validated KYC submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KycSubmission {
    /// Subject wallet.
    pub subject: SubjectAddress,
    /// Off-chain user id.
    pub user_id: UserId,
    /// Document reference.
    pub content_hash: ContentHash,
    /// Initial risk score.
    pub risk_score: RiskScore,
    /// Jurisdiction of verification.
    pub jurisdiction: JurisdictionCode,
}

impl KycSubmission {
    /// Validate raw request fields.
    pub fn new(
        subject: &str,
        user_id: &str,
        content_hash: &str,
        risk_score: u32,
        jurisdiction: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            subject: SubjectAddress::new(subject)?,
            user_id: UserId::new(user_id)?,
            content_hash: ContentHash::new(content_hash)?,
            risk_score: RiskScore::new(risk_score)?,
            jurisdiction: JurisdictionCode::new(jurisdiction)?,
        })
    }

    fn operation(&self) -> LedgerOperation {
        LedgerOperation::StoreKycData {
            subject: self.subject.clone(),
            user_id: self.user_id.clone(),
            content_hash: self.content_hash.clone(),
            risk_score: self.risk_score,
            jurisdiction: self.jurisdiction.clone(),
        }
    }
}

/// Outcome of settling one subject against the ledger.
enum Settlement {
    /// Mirror now matches the ledger.
    Settled {
        record: Option<VerificationRecord>,
        write_confirmed: bool,
    },
    /// Ledger state did not settle the entry.
    Unsettled {
        entry: MirrorEntry,
        newly_diverged: bool,
    },
}

/// Top-level orchestrator over the ledger, multisig coordinator, audit
/// recorder, compliance evaluator and mirror.
#[derive(Debug)]
pub struct ReconciliationService {
    gateway: Arc<dyn LedgerGateway>,
    mirror: Arc<dyn MirrorStore>,
    audit: AuditRecorder,
    compliance: ComplianceEvaluator,
    multisig: MultisigCoordinator,
    clock: Arc<dyn Clock>,
    locks: SubjectLocks,
    config: ServiceConfig,
}

impl ReconciliationService {
    /// Assemble the service over `ledger`.
    ///
    /// Every ledger call is bounded by the configured timeout and
    /// unreachable reads are retried per the configured policy.
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        mirror: Arc<dyn MirrorStore>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let gateway: Arc<dyn LedgerGateway> =
            Arc::new(GuardedGateway::new(ledger, config.call_timeout(), config.retry));
        let audit = AuditRecorder::new(Arc::clone(&gateway)).with_page_size(config.audit_page_size);
        let multisig = MultisigCoordinator::new(
            Arc::clone(&gateway),
            Arc::new(LedgerSignerDirectory::new(Arc::clone(&gateway))),
            audit.clone(),
            Arc::clone(&clock),
            config.coordinator(),
        );
        let compliance = ComplianceEvaluator::new(Arc::clone(&gateway), Arc::clone(&clock));
        Self {
            gateway,
            mirror,
            audit,
            compliance,
            multisig,
            clock,
            locks: SubjectLocks::new(),
            config,
        }
    }

    /// The audit recorder.
    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// The multisig coordinator.
    pub fn multisig(&self) -> &MultisigCoordinator {
        &self.multisig
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Write entry points
    // -----------------------------------------------------------------------

    /// Store a KYC submission. The record starts `Pending`.
    pub async fn submit_kyc(&self, submission: KycSubmission) -> Result<OperationOutcome, ServiceError> {
        let subject = submission.subject.clone();
        let _guard = self.locks.lock(&subject).await;
        let prior = self.prior_digest(&subject).await;
        let actor = Actor::Subject {
            address: subject.clone(),
        };
        tracing::info!(%subject, jurisdiction = %submission.jurisdiction, "kyc submission");
        self.direct_write(&subject, submission.operation(), actor, prior).await
    }

    /// Propose or sign an approval.
    pub async fn approve(
        &self,
        subject: &SubjectAddress,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        self.update_status(subject, DecisionStatus::Approved, signer).await
    }

    /// Propose or sign a rejection.
    pub async fn reject(
        &self,
        subject: &SubjectAddress,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        self.update_status(subject, DecisionStatus::Rejected, signer).await
    }

    /// Propose or sign a revocation of an approved record.
    pub async fn revoke(
        &self,
        subject: &SubjectAddress,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        self.update_status(subject, DecisionStatus::Revoked, signer).await
    }

    /// Propose or sign a status decision.
    ///
    /// Unconfirmed decisions for the subject are settled first. The ledger
    /// record is then read: a subject already in the requested status is a
    /// no-op, and a transition the ledger would refuse is rejected before
    /// any proposal is opened.
    pub async fn update_status(
        &self,
        subject: &SubjectAddress,
        status: DecisionStatus,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        let _guard = self.locks.lock(subject).await;
        self.settle_executions(subject).await;
        let record = self
            .ledger_record(subject)
            .await?
            .ok_or_else(|| ServiceError::NotRegistered(subject.clone()))?;

        if record.status == status.status() {
            tracing::debug!(%subject, %status, "status already on ledger");
            return Ok(OperationOutcome::NoOp { record });
        }
        if !status.allowed_from(record.status) {
            return Err(ServiceError::InvalidTransition {
                subject: subject.clone(),
                from: record.status,
                to: status.status(),
            });
        }

        let proposed = self
            .multisig
            .propose(PrivilegedOperation::decide(subject.clone(), status), signer)
            .await?;
        self.after_signature(Some(subject), proposed.proposal_id, proposed.outcome)
            .await
    }

    /// Propose or sign an administrative change (signer set, threshold,
    /// jurisdiction rules).
    pub async fn propose(
        &self,
        operation: PrivilegedOperation,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        if let Some(subject) = operation.subject().cloned() {
            let status = match operation.operation() {
                LedgerOperation::UpdateKycStatus { status, .. } => *status,
                _ => {
                    return Err(ValidationError::InvalidField {
                        field: "operation",
                        reason: "unexpected subject operation".into(),
                    }
                    .into())
                }
            };
            return self.update_status(&subject, status, signer).await;
        }
        let proposed = self.multisig.propose(operation, signer).await?;
        self.after_signature(None, proposed.proposal_id, proposed.outcome)
            .await
    }

    /// Sign an open proposal.
    pub async fn sign(
        &self,
        proposal_id: ProposalId,
        signer: &SignerId,
    ) -> Result<OperationOutcome, ServiceError> {
        let subject = self.proposal_subject(proposal_id).await?;
        let _guard = match &subject {
            Some(s) => Some(self.locks.lock(s).await),
            None => None,
        };
        let outcome = self.multisig.sign(proposal_id, signer).await?;
        self.after_signature(subject.as_ref(), proposal_id, outcome)
            .await
    }

    /// Veto an open proposal.
    pub async fn veto(&self, proposal_id: ProposalId, signer: &SignerId) -> Result<(), ServiceError> {
        self.multisig.reject(proposal_id, signer).await?;
        Ok(())
    }

    /// Settle a proposal whose quorum was reached but whose execution was
    /// not confirmed.
    pub async fn resolve_proposal(&self, proposal_id: ProposalId) -> Result<OperationOutcome, ServiceError> {
        let subject = self.proposal_subject(proposal_id).await?;
        let _guard = match &subject {
            Some(s) => Some(self.locks.lock(s).await),
            None => None,
        };
        let outcome = self.multisig.resolve_execution(proposal_id).await?;
        self.after_signature(subject.as_ref(), proposal_id, outcome)
            .await
    }

    /// Write a new risk score for a registered subject.
    pub async fn update_risk_score(
        &self,
        subject: &SubjectAddress,
        risk_score: RiskScore,
    ) -> Result<OperationOutcome, ServiceError> {
        let _guard = self.locks.lock(subject).await;
        let record = self
            .ledger_record(subject)
            .await?
            .ok_or_else(|| ServiceError::NotRegistered(subject.clone()))?;
        if record.risk_score == risk_score {
            return Ok(OperationOutcome::NoOp { record });
        }
        let prior = record.digest().ok();
        let op = LedgerOperation::UpdateRiskScore {
            subject: subject.clone(),
            risk_score,
        };
        self.direct_write(subject, op, Actor::System, prior).await
    }

    /// Apply a risk scorer batch. Subjects are processed in report order;
    /// one subject's failure does not stop the batch.
    pub async fn apply_risk_batch(&self, report: RiskBatchReport) -> RiskBatchSummary {
        let scored = report
            .results
            .iter()
            .filter(|r| matches!(r, ScoreResult::Scored { .. }))
            .count();
        if scored != report.successful {
            tracing::warn!(
                reported = report.successful,
                scored,
                "scorer totals disagree with per-subject results"
            );
        }

        let mut summary = RiskBatchSummary {
            processed: report.processed,
            ..RiskBatchSummary::default()
        };
        for result in report.results {
            match result {
                ScoreResult::Scored {
                    subject,
                    risk_score,
                } => {
                    let status = self.apply_score(&subject, risk_score).await;
                    summary.push(subject, status);
                }
                ScoreResult::Failed { subject, error } => {
                    summary.push(subject, RiskUpdateStatus::ScorerFailed { reason: error });
                }
            }
        }
        tracing::info!(
            processed = summary.processed,
            applied = summary.applied,
            pending = summary.pending,
            rejected = summary.rejected,
            "risk batch applied"
        );
        summary
    }

    async fn apply_score(&self, subject: &str, risk_score: u32) -> RiskUpdateStatus {
        let parsed = SubjectAddress::new(subject).and_then(|s| Ok((s, RiskScore::new(risk_score)?)));
        let (subject, score) = match parsed {
            Ok(p) => p,
            Err(e) => {
                return RiskUpdateStatus::Rejected {
                    reason: e.to_string(),
                }
            }
        };
        match self.update_risk_score(&subject, score).await {
            Ok(OperationOutcome::Confirmed { .. }) => RiskUpdateStatus::Applied,
            Ok(OperationOutcome::NoOp { .. }) => RiskUpdateStatus::Unchanged,
            Ok(OperationOutcome::Ambiguous { .. } | OperationOutcome::AwaitingSignatures { .. }) => {
                RiskUpdateStatus::Pending
            }
            Err(e) => RiskUpdateStatus::Rejected {
                reason: e.to_string(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Read entry points
    // -----------------------------------------------------------------------

    /// Current verification status.
    ///
    /// A fresh mirror entry is served directly. Otherwise the ledger is
    /// read, the mirror settled from it, and the result served.
    pub async fn get_status(&self, subject: &SubjectAddress) -> Result<StatusView, ServiceError> {
        match self.mirror.get(subject).await {
            Ok(Some(entry)) if !entry.state.needs_reconcile() => {
                return Ok(StatusView {
                    subject: subject.clone(),
                    record: entry.record,
                    source: StatusSource::Mirror,
                    mirror_state: Some(entry.state),
                })
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%subject, error = %e, "mirror read failed"),
        }

        let _guard = self.locks.lock(subject).await;
        match self.settle(subject).await {
            Ok(Settlement::Settled { record, .. }) => Ok(StatusView {
                subject: subject.clone(),
                mirror_state: record.as_ref().map(|_| MirrorState::Fresh),
                record,
                source: StatusSource::Ledger,
            }),
            Ok(Settlement::Unsettled { entry, .. }) => Ok(StatusView {
                subject: subject.clone(),
                record: entry.record,
                source: StatusSource::StaleMirror,
                mirror_state: Some(entry.state),
            }),
            Err(ServiceError::Mirror(_)) => Ok(StatusView {
                subject: subject.clone(),
                record: self.ledger_record(subject).await?,
                source: StatusSource::Ledger,
                mirror_state: None,
            }),
            Err(e) => Err(e),
        }
    }

    /// Audit events for `subject`, oldest first.
    pub fn get_audit_log(&self, subject: &SubjectAddress, limit: usize, filter: AuditFilter) -> AuditQuery {
        self.audit.query(subject, limit, filter)
    }

    /// Evaluate `subject`'s current record for `jurisdiction`.
    pub async fn get_compliance(
        &self,
        subject: &SubjectAddress,
        jurisdiction: &str,
    ) -> Result<ComplianceResult, ServiceError> {
        let record = self
            .get_status(subject)
            .await?
            .record
            .ok_or_else(|| ServiceError::NotRegistered(subject.clone()))?;
        self.compliance
            .evaluate(&record, jurisdiction)
            .await
            .map_err(|e| ServiceError::ledger("getJurisdictionRules", e))
    }

    /// State of proposal `proposal_id`.
    pub async fn get_multisig_state(&self, proposal_id: ProposalId) -> Option<MultisigProposal> {
        self.multisig.get(proposal_id).await
    }

    /// Proposals not yet terminal.
    pub async fn pending_proposals(&self) -> Vec<MultisigProposal> {
        self.multisig.pending_proposals().await
    }

    /// Counts derived from recorded state.
    pub async fn statistics(&self) -> ServiceStatistics {
        use kyc_core::ActionKind;

        let audit = self.audit.statistics();
        let stale_subjects = match self.mirror.list_stale().await {
            Ok(stale) => stale.len(),
            Err(e) => {
                tracing::warn!(error = %e, "mirror unavailable for statistics");
                0
            }
        };
        ServiceStatistics {
            submissions: audit.count(ActionKind::KycSubmitted),
            approvals: audit.count(ActionKind::KycApproved),
            rejections: audit.count(ActionKind::KycRejected),
            revocations: audit.count(ActionKind::KycRevoked),
            risk_updates: audit.count(ActionKind::RiskScoreUpdated),
            pending_proposals: self.multisig.pending_proposals().await.len(),
            stale_subjects,
            audit,
        }
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Re-read the ledger for every stale mirror entry and settle it.
    pub async fn reconcile_stale(&self) -> Result<ReconcileReport, ServiceError> {
        let subjects = self.mirror.list_stale().await?;
        let mut report = ReconcileReport::default();
        for subject in subjects {
            let _guard = self.locks.lock(&subject).await;
            report.checked += 1;
            match self.settle(&subject).await {
                Ok(Settlement::Settled {
                    write_confirmed, ..
                }) => {
                    report.corrected += 1;
                    if write_confirmed {
                        report.writes_confirmed += 1;
                    }
                }
                Ok(Settlement::Unsettled { newly_diverged, .. }) => {
                    report.still_stale += 1;
                    if newly_diverged {
                        report.diverged.push(subject.clone());
                    }
                }
                Err(e) => {
                    report.still_stale += 1;
                    tracing::warn!(%subject, error = %e, "reconciliation failed");
                }
            }
        }
        metrics::counter!("kyc_reconcile_corrections_total").increment(report.corrected as u64);
        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                corrected = report.corrected,
                still_stale = report.still_stale,
                diverged = report.diverged.len(),
                "reconciliation pass complete"
            );
        }
        Ok(report)
    }

    /// One full maintenance pass: expire proposals, settle unconfirmed
    /// executions, reconcile stale mirror entries and repair audit gaps.
    pub async fn sweep(&self) -> SweepReport {
        let expired_proposals = self.multisig.expire_due().await.len();

        let mut resolved_executions = 0;
        for id in self.multisig.unresolved_executions().await {
            match self.resolve_proposal(id).await {
                Ok(outcome) if outcome.is_settled() => resolved_executions += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(proposal_id = %id, error = %e, "execution still unresolved"),
            }
        }

        let reconcile = match self.reconcile_stale().await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(error = %e, "mirror unavailable for reconciliation");
                ReconcileReport::default()
            }
        };
        let audit_repair = self.audit.repair_gaps().await;
        self.locks.prune();

        SweepReport {
            reconcile,
            expired_proposals,
            resolved_executions,
            audit_repair,
        }
    }

    /// Settle `subject`'s mirror entry against the ledger. Caller holds the
    /// subject lock.
    async fn settle(&self, subject: &SubjectAddress) -> Result<Settlement, ServiceError> {
        let entry = self.mirror.get(subject).await?;
        let read = self.ledger_record(subject).await;

        if let Ok(record) = &read {
            let pending = entry.as_ref().and_then(|e| e.pending.as_ref());
            // The write must be reflected by a record no older than the
            // submission itself.
            let pending_visible = pending.map_or(true, |p| {
                p.operation
                    .is_reflected_in(&LedgerValue::Verification(record.clone()))
                    && record.as_ref().is_some_and(|r| r.updated_at >= p.submitted_at)
            });
            if pending_visible && (record.is_some() || entry.is_none()) {
                let mut write_confirmed = false;
                if let Some(p) = pending {
                    tracing::info!(%subject, tx_hash = ?p.tx_hash, "pending write found applied");
                    let proof = WriteProof::Reconciled {
                        contract: p.operation.contract(),
                        tx_hash: p.tx_hash.clone(),
                    };
                    self.record_audit(p.actor.clone(), &p.operation, proof, p.prior_state)
                        .await;
                    write_confirmed = true;
                }
                if let Some(record) = record {
                    self.mirror
                        .upsert(MirrorEntry::fresh(record.clone(), self.clock.now()))
                        .await?;
                }
                return Ok(Settlement::Settled {
                    record: record.clone(),
                    write_confirmed,
                });
            }
        }

        let Some(mut entry) = entry else {
            return read.map(|record| Settlement::Settled {
                record,
                write_confirmed: false,
            });
        };
        entry.attempts += 1;
        let newly_diverged =
            entry.attempts >= self.config.max_reconcile_attempts && entry.state != MirrorState::Diverged;
        if newly_diverged {
            entry.state = MirrorState::Diverged;
            metrics::counter!("kyc_reconcile_divergence_total").increment(1);
            tracing::warn!(
                %subject,
                attempts = entry.attempts,
                stale_since = ?entry.stale_since,
                "mirror diverged from ledger"
            );
        } else if let Err(e) = &read {
            tracing::debug!(%subject, attempts = entry.attempts, error = %e, "ledger read failed");
        }
        self.mirror.upsert(entry.clone()).await?;
        Ok(Settlement::Unsettled {
            entry,
            newly_diverged,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn direct_write(
        &self,
        subject: &SubjectAddress,
        op: LedgerOperation,
        actor: Actor,
        prior: Option<ContentDigest>,
    ) -> Result<OperationOutcome, ServiceError> {
        match self.gateway.submit(&op).await {
            WriteOutcome::Confirmed(receipt) => {
                let tx_hash = Some(receipt.tx_hash.clone());
                let record = self.refresh_mirror(subject).await;
                let (audit_event, audit_gap) = self
                    .record_audit(actor, &op, WriteProof::from(receipt), prior)
                    .await;
                Ok(OperationOutcome::Confirmed {
                    tx_hash,
                    record,
                    audit_event,
                    audit_gap,
                })
            }
            WriteOutcome::Ambiguous { tx_hash, .. } => {
                tracing::warn!(
                    %subject,
                    operation = op.function_name(),
                    tx_hash = ?tx_hash,
                    "write unconfirmed, mirror marked stale"
                );
                let pending = PendingWrite {
                    operation: op,
                    actor,
                    tx_hash: tx_hash.clone(),
                    prior_state: prior,
                    submitted_at: self.clock.now(),
                };
                self.mark_stale(subject, Some(pending)).await;
                Ok(OperationOutcome::Ambiguous {
                    tx_hash,
                    proposal_id: None,
                })
            }
            WriteOutcome::Failed(e) => {
                tracing::warn!(%subject, operation = op.function_name(), error = %e, "write failed");
                Err(ServiceError::ledger(op.function_name(), e))
            }
        }
    }

    async fn after_signature(
        &self,
        subject: Option<&SubjectAddress>,
        proposal_id: ProposalId,
        outcome: SignOutcome,
    ) -> Result<OperationOutcome, ServiceError> {
        match outcome {
            SignOutcome::Pending {
                collected,
                threshold,
            } => Ok(OperationOutcome::AwaitingSignatures {
                proposal_id,
                collected,
                threshold,
            }),
            SignOutcome::Executed {
                tx_hash,
                audit_event,
                audit_gap,
                ..
            } => {
                let record = match subject {
                    Some(s) => self.refresh_mirror(s).await,
                    None => None,
                };
                Ok(OperationOutcome::Confirmed {
                    tx_hash,
                    record,
                    audit_event,
                    audit_gap,
                })
            }
            SignOutcome::ExecutionPending { tx_hash } => {
                if let Some(s) = subject {
                    self.mark_stale(s, None).await;
                }
                Ok(OperationOutcome::Ambiguous {
                    tx_hash,
                    proposal_id: Some(proposal_id),
                })
            }
        }
    }

    /// Resolve every quorum-reached, unconfirmed proposal for `subject`.
    /// Caller holds the subject lock.
    async fn settle_executions(&self, subject: &SubjectAddress) {
        let in_flight: Vec<ProposalId> = self
            .multisig
            .pending_proposals()
            .await
            .into_iter()
            .filter(|p| p.has_quorum() && p.operation.subject() == Some(subject))
            .map(|p| p.id)
            .collect();
        for id in in_flight {
            let settled = match self.multisig.resolve_execution(id).await {
                Ok(outcome) => self.after_signature(Some(subject), id, outcome).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = settled {
                tracing::warn!(%subject, proposal_id = %id, error = %e, "earlier decision still unresolved");
            }
        }
    }

    async fn proposal_subject(&self, proposal_id: ProposalId) -> Result<Option<SubjectAddress>, ServiceError> {
        let proposal = self
            .multisig
            .get(proposal_id)
            .await
            .ok_or(MultisigError::Signer(SignerError::UnknownProposal(proposal_id)))?;
        Ok(proposal.operation.subject().cloned())
    }

    async fn ledger_record(&self, subject: &SubjectAddress) -> Result<Option<VerificationRecord>, ServiceError> {
        let query = LedgerQuery::GetVerification {
            subject: subject.clone(),
        };
        self.gateway
            .read(&query)
            .await
            .and_then(LedgerValue::into_verification)
            .map_err(|e| ServiceError::ledger(query.function_name(), e))
    }

    async fn prior_digest(&self, subject: &SubjectAddress) -> Option<ContentDigest> {
        match self.ledger_record(subject).await {
            Ok(record) => record.and_then(|r| r.digest().ok()),
            Err(e) => {
                tracing::debug!(%subject, error = %e, "prior state unavailable");
                None
            }
        }
    }

    /// Re-read `subject` after a confirmed write and store it in the
    /// mirror. A failed read leaves the entry stale.
    async fn refresh_mirror(&self, subject: &SubjectAddress) -> Option<VerificationRecord> {
        match self.ledger_record(subject).await {
            Ok(Some(record)) => {
                let entry = MirrorEntry::fresh(record.clone(), self.clock.now());
                if let Err(e) = self.mirror.upsert(entry).await {
                    tracing::warn!(%subject, error = %e, "mirror update failed");
                    self.mark_stale(subject, None).await;
                }
                Some(record)
            }
            Ok(None) => {
                self.mark_stale(subject, None).await;
                None
            }
            Err(e) => {
                tracing::warn!(%subject, error = %e, "read-back failed, mirror marked stale");
                self.mark_stale(subject, None).await;
                None
            }
        }
    }

    async fn mark_stale(&self, subject: &SubjectAddress, pending: Option<PendingWrite>) {
        if let Err(e) = self.mirror.mark_stale(subject, pending, self.clock.now()).await {
            tracing::error!(%subject, error = %e, "could not mark mirror stale");
        }
    }

    async fn record_audit(
        &self,
        actor: Actor,
        op: &LedgerOperation,
        proof: WriteProof,
        prior: Option<ContentDigest>,
    ) -> (Option<EventId>, bool) {
        let Some(action) = op.action() else {
            return (None, false);
        };
        let subject = op.subject().cloned().unwrap_or_else(SubjectAddress::zero);
        let event =
            AuditEvent::new(actor, subject, action, proof, self.clock.now()).with_prior_state(prior);
        match self.audit.record(event).await {
            Ok(id) => (Some(id), false),
            Err(AuditError::Gap { event_id, .. }) => (Some(event_id), true),
            Err(AuditError::Duplicate(id)) => (Some(id), false),
        }
    }
}
