//! # Multisig Proposal State Machine
//!
//! ```text
//!            add_signature (count < threshold)
//!              ┌──────┐
//!              ▼      │
//!           Pending ──┘──── quorum + confirmed write ──▶ Executed
//!            │  │  └──────── quorum + reverted write ──▶ Failed
//!            │  └─────────── reject ───────────────────▶ Rejected
//!            └────────────── expiry without quorum ────▶ Expired
//! ```
//!
//! All four right-hand states are terminal. A proposal whose quorum was
//! reached cannot expire: its execution write may already be on the ledger,
//! so only execution resolution may move it.
//!
//! Signatures are validated against the signer set and threshold passed in
//! by the caller, which reads them fresh from the ledger for every
//! signature. Only signatures from currently authorized signers count
//! toward the quorum.

use serde::{Deserialize, Serialize};

use kyc_core::{
    Actor, ContentDigest, JurisdictionCode, ProposalId, SignerId, SubjectAddress, Timestamp, ValidationError,
};
use kyc_ledger::{DecisionStatus, JurisdictionRuleSet, LedgerOperation, Receipt};

use crate::error::SignerError;

// ---------------------------------------------------------------------------
// Privileged operation
// ---------------------------------------------------------------------------

/// A ledger operation that may only execute through a quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LedgerOperation", into = "LedgerOperation")]
pub struct PrivilegedOperation(LedgerOperation);

impl PrivilegedOperation {
    /// Wrap `op`, rejecting non-privileged operations.
    pub fn new(op: LedgerOperation) -> Result<Self, ValidationError> {
        if !op.is_privileged() {
            return Err(ValidationError::InvalidField {
                field: "operation",
                reason: format!("{} does not require a quorum", op.function_name()),
            });
        }
        Ok(Self(op))
    }

    /// Status decision for `subject`.
    pub fn decide(subject: SubjectAddress, status: DecisionStatus) -> Self {
        Self(LedgerOperation::UpdateKycStatus { subject, status })
    }

    /// Authorize `signer`.
    pub fn add_signer(signer: SignerId) -> Self {
        Self(LedgerOperation::AddSigner { signer })
    }

    /// Deauthorize `signer`.
    pub fn remove_signer(signer: SignerId) -> Self {
        Self(LedgerOperation::RemoveSigner { signer })
    }

    /// Change the quorum size.
    pub fn set_threshold(threshold: u8) -> Result<Self, ValidationError> {
        let threshold = std::num::NonZeroU8::new(threshold).ok_or(ValidationError::InvalidField {
            field: "threshold",
            reason: "must be at least 1".into(),
        })?;
        Ok(Self(LedgerOperation::SetThreshold { threshold }))
    }

    /// Create or replace a jurisdiction rule set.
    pub fn set_rules(rules: JurisdictionRuleSet) -> Self {
        Self(LedgerOperation::SetJurisdictionRules(rules))
    }

    /// The underlying ledger write.
    pub fn operation(&self) -> &LedgerOperation {
        &self.0
    }

    /// Subject whose record changes, for status decisions.
    pub fn subject(&self) -> Option<&SubjectAddress> {
        self.0.subject()
    }

    /// Subject the execution audit event is filed under: the record's
    /// subject, the affected signer, or the zero address.
    pub fn audit_subject(&self) -> SubjectAddress {
        match &self.0 {
            LedgerOperation::AddSigner { signer } | LedgerOperation::RemoveSigner { signer } => {
                SubjectAddress::from(signer.clone())
            }
            op => op.subject().cloned().unwrap_or_else(SubjectAddress::zero),
        }
    }

    /// Jurisdiction whose rules change, for rule-set proposals.
    pub fn jurisdiction(&self) -> Option<&JurisdictionCode> {
        match &self.0 {
            LedgerOperation::SetJurisdictionRules(rules) => Some(&rules.jurisdiction),
            _ => None,
        }
    }
}

impl TryFrom<LedgerOperation> for PrivilegedOperation {
    type Error = ValidationError;

    fn try_from(op: LedgerOperation) -> Result<Self, Self::Error> {
        Self::new(op)
    }
}

impl From<PrivilegedOperation> for LedgerOperation {
    fn from(op: PrivilegedOperation) -> Self {
        op.0
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    /// Collecting signatures.
    Pending,
    /// Execution write confirmed. Terminal.
    Executed,
    /// Execution write reverted. Terminal.
    Failed,
    /// Expiry passed without quorum. Terminal.
    Expired,
    /// Vetoed by a signer. Terminal.
    Rejected,
}

impl ProposalStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Executed => "EXECUTED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// One collected signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Signer.
    pub signer: SignerId,
    /// Arrival time.
    pub signed_at: Timestamp,
}

/// Execution write submitted but not confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightExecution {
    /// Transaction hash, if the node acknowledged submission.
    pub tx_hash: Option<String>,
    /// Submission time.
    pub submitted_at: Timestamp,
    /// Digest of the record the execution replaces, read before the write.
    pub prior_state: Option<ContentDigest>,
}

/// Result of a signature that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureProgress {
    /// Below threshold.
    Collecting {
        /// Valid signatures.
        collected: usize,
        /// Required signatures.
        threshold: u8,
    },
    /// Quorum reached; the operation must now be executed.
    QuorumReached,
}

/// A privileged operation awaiting or past quorum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultisigProposal {
    /// Identifier.
    pub id: ProposalId,
    /// What executes on quorum.
    pub operation: PrivilegedOperation,
    /// Signer who opened the proposal.
    pub proposer: SignerId,
    /// Threshold as of the latest signature.
    pub threshold: u8,
    /// Signatures in arrival order, at most one per signer.
    pub signatures: Vec<Signature>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Signatures are refused after this instant unless quorum was reached.
    pub expires_at: Timestamp,
    /// Lifecycle status.
    pub status: ProposalStatus,
    /// When the quorum was reached.
    pub quorum_reached_at: Option<Timestamp>,
    /// Ambiguous execution awaiting resolution.
    pub in_flight: Option<InFlightExecution>,
    /// Execution writes that failed to reach the ledger.
    pub execution_attempts: u32,
    /// Receipt of the confirmed execution. `None` for executions confirmed
    /// by a reconciliation read.
    pub receipt: Option<Receipt>,
    /// Transaction hash of the execution.
    pub execution_tx: Option<String>,
    /// Revert reason or rejecting signer.
    pub terminal_reason: Option<String>,
    /// Time of the terminal transition.
    pub closed_at: Option<Timestamp>,
}

impl MultisigProposal {
    /// Open a proposal. The proposer's signature is added separately.
    pub fn new(
        operation: PrivilegedOperation,
        proposer: SignerId,
        threshold: u8,
        now: Timestamp,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id: ProposalId::new(),
            operation,
            proposer,
            threshold,
            signatures: Vec::new(),
            created_at: now,
            expires_at: now.plus(ttl),
            status: ProposalStatus::Pending,
            quorum_reached_at: None,
            in_flight: None,
            execution_attempts: 0,
            receipt: None,
            execution_tx: None,
            terminal_reason: None,
            closed_at: None,
        }
    }

    /// Whether `signer` has signed.
    pub fn has_signed(&self, signer: &SignerId) -> bool {
        self.signatures.iter().any(|s| &s.signer == signer)
    }

    /// Signatures from signers in `authorized`.
    pub fn valid_signatures(&self, authorized: &[SignerId]) -> usize {
        self.signatures
            .iter()
            .filter(|s| authorized.contains(&s.signer))
            .count()
    }

    /// Signers in arrival order.
    pub fn signers(&self) -> Vec<SignerId> {
        self.signatures.iter().map(|s| s.signer.clone()).collect()
    }

    /// The quorum as an audit actor.
    pub fn quorum_actor(&self) -> Actor {
        Actor::Quorum {
            signers: self.signers(),
        }
    }

    /// Whether the quorum was reached.
    pub fn has_quorum(&self) -> bool {
        self.quorum_reached_at.is_some()
    }

    /// Whether the proposal is overdue at `now`. Proposals with quorum
    /// never expire.
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == ProposalStatus::Pending && !self.has_quorum() && now > self.expires_at
    }

    fn ensure_open(&self, now: Timestamp) -> Result<(), SignerError> {
        if self.status.is_terminal() {
            return Err(SignerError::ProposalAlreadyTerminal {
                proposal: self.id,
                status: self.status,
            });
        }
        if self.is_due(now) {
            return Err(SignerError::ProposalExpired(self.id));
        }
        Ok(())
    }

    fn check_signer(
        &self,
        signer: &SignerId,
        authorized: &[SignerId],
        threshold: u8,
    ) -> Result<(), SignerError> {
        if threshold == 0 || usize::from(threshold) > authorized.len() {
            return Err(SignerError::InvalidThreshold {
                threshold,
                signers: authorized.len(),
            });
        }
        if !authorized.contains(signer) {
            return Err(SignerError::InvalidSigner(signer.clone()));
        }
        Ok(())
    }

    /// Add `signer`'s signature.
    ///
    /// `authorized` and `threshold` are the ledger's current values. An
    /// overdue proposal transitions to `Expired` and refuses the signature.
    /// Every other refusal leaves the proposal unchanged.
    pub fn add_signature(
        &mut self,
        signer: &SignerId,
        authorized: &[SignerId],
        threshold: u8,
        now: Timestamp,
    ) -> Result<SignatureProgress, SignerError> {
        if let Err(e) = self.ensure_open(now) {
            if matches!(e, SignerError::ProposalExpired(_)) {
                self.close(ProposalStatus::Expired, now, None);
            }
            return Err(e);
        }
        if self.has_quorum() {
            return Err(SignerError::QuorumAlreadyReached(self.id));
        }
        self.check_signer(signer, authorized, threshold)?;
        if self.has_signed(signer) {
            return Err(SignerError::DuplicateSignature {
                proposal: self.id,
                signer: signer.clone(),
            });
        }

        self.signatures.push(Signature {
            signer: signer.clone(),
            signed_at: now,
        });
        self.threshold = threshold;

        let collected = self.valid_signatures(authorized);
        if collected >= usize::from(threshold) {
            self.quorum_reached_at = Some(now);
            Ok(SignatureProgress::QuorumReached)
        } else {
            Ok(SignatureProgress::Collecting {
                collected,
                threshold,
            })
        }
    }

    /// Veto by `signer`. Refused once quorum is reached.
    pub fn reject(
        &mut self,
        signer: &SignerId,
        authorized: &[SignerId],
        threshold: u8,
        now: Timestamp,
    ) -> Result<(), SignerError> {
        if let Err(e) = self.ensure_open(now) {
            if matches!(e, SignerError::ProposalExpired(_)) {
                self.close(ProposalStatus::Expired, now, None);
            }
            return Err(e);
        }
        if self.has_quorum() {
            return Err(SignerError::QuorumAlreadyReached(self.id));
        }
        self.check_signer(signer, authorized, threshold)?;
        self.close(
            ProposalStatus::Rejected,
            now,
            Some(format!("rejected by {signer}")),
        );
        Ok(())
    }

    /// Transition to `Expired` if overdue. Returns whether it did.
    pub fn expire_if_due(&mut self, now: Timestamp) -> bool {
        if self.is_due(now) {
            self.close(ProposalStatus::Expired, now, None);
            true
        } else {
            false
        }
    }

    /// Record an ambiguous execution.
    pub fn mark_in_flight(
        &mut self,
        tx_hash: Option<String>,
        prior_state: Option<ContentDigest>,
        now: Timestamp,
    ) {
        self.execution_tx = tx_hash.clone();
        self.in_flight = Some(InFlightExecution {
            tx_hash,
            submitted_at: now,
            prior_state,
        });
    }

    /// Record an execution write that never reached the ledger.
    pub fn mark_not_applied(&mut self) {
        self.execution_attempts += 1;
    }

    /// Record a confirmed execution.
    pub fn mark_executed(
        &mut self,
        receipt: Option<Receipt>,
        tx_hash: Option<String>,
        now: Timestamp,
    ) {
        self.execution_tx = receipt.as_ref().map(|r| r.tx_hash.clone()).or(tx_hash);
        self.receipt = receipt;
        self.in_flight = None;
        self.close(ProposalStatus::Executed, now, None);
    }

    /// Record a reverted execution.
    pub fn mark_failed(&mut self, reason: String, now: Timestamp) {
        self.in_flight = None;
        self.close(ProposalStatus::Failed, now, Some(reason));
    }

    fn close(&mut self, status: ProposalStatus, now: Timestamp, reason: Option<String>) {
        debug_assert!(!self.status.is_terminal(), "terminal proposals never transition");
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.closed_at = Some(now);
        self.terminal_reason = reason;
    }
}
