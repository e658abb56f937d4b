//! # Audit Events
//!
//! An [`AuditEvent`] can only be built from a [`WriteProof`], i.e. from
//! evidence that the triggering ledger write happened: either its
//! [`Receipt`] or a reconciliation read that found it applied.

use serde::{Deserialize, Serialize};

use kyc_core::{
    sha256_digest, ActionKind, ActionOutcome, Actor, CanonicalBytes, CanonicalizationError,
    ContentDigest, EventId, SubjectAddress, Timestamp,
};
use kyc_ledger::{AuditEntry, ContractId, Receipt};

/// Evidence that a state-changing ledger write took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteProof {
    /// Confirmation observed directly.
    Confirmed {
        /// The write's receipt.
        receipt: Receipt,
    },
    /// Confirmation timed out; a later read found the write applied.
    Reconciled {
        /// Contract written to.
        contract: ContractId,
        /// Transaction hash, when the node acknowledged submission.
        tx_hash: Option<String>,
    },
}

impl WriteProof {
    /// Outcome recorded on the event.
    pub fn outcome(&self) -> ActionOutcome {
        match self {
            Self::Confirmed { .. } => ActionOutcome::Applied,
            Self::Reconciled { .. } => ActionOutcome::Reconciled,
        }
    }

    /// Transaction hash of the triggering write, if known.
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::Confirmed { receipt } => Some(&receipt.tx_hash),
            Self::Reconciled { tx_hash, .. } => tx_hash.as_deref(),
        }
    }
}

impl From<Receipt> for WriteProof {
    fn from(receipt: Receipt) -> Self {
        Self::Confirmed { receipt }
    }
}

/// Immutable record of one state-changing action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique id, also the audit log contract key.
    pub id: EventId,
    /// Who caused the action.
    pub actor: Actor,
    /// Subject concerned.
    pub subject: SubjectAddress,
    /// What happened.
    pub action: ActionKind,
    /// When the action was recorded.
    pub timestamp: Timestamp,
    /// Digest of the verification record the action replaced.
    pub prior_state: Option<ContentDigest>,
    /// How the triggering write reached the ledger.
    pub outcome: ActionOutcome,
    /// Evidence of the triggering write.
    pub proof: WriteProof,
    /// Free-form context (signer set of a proposal, batch id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Build an event for a write that took effect.
    pub fn new(
        actor: Actor,
        subject: SubjectAddress,
        action: ActionKind,
        proof: WriteProof,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: EventId::new(),
            actor,
            subject,
            action,
            timestamp,
            prior_state: None,
            outcome: proof.outcome(),
            proof,
            metadata: None,
        }
    }

    /// Reference the state this action replaced.
    pub fn with_prior_state(mut self, digest: Option<ContentDigest>) -> Self {
        self.prior_state = digest;
        self
    }

    /// Attach structured context.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The audit log contract payload.
    pub fn to_entry(&self) -> AuditEntry {
        AuditEntry {
            event_id: self.id,
            actor: self.actor.ledger_address(),
            subject: self.subject.clone(),
            action: self.action,
            prior_state: self.prior_state,
            outcome: self.outcome,
        }
    }

    /// Content digest of the whole event.
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}
