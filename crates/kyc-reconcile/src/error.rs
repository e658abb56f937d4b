//! # Service Errors
//!
//! Every failure tells the caller which of three situations it is in:
//!
//! - [`Disposition::NotApplied`]: nothing happened on the ledger. Safe to
//!   retry or correct the request.
//! - [`Disposition::PendingVisibility`]: the operation may have happened
//!   and its effects are not yet visible.
//! - [`Disposition::FailedPermanently`]: the operation was attempted and
//!   will not take effect. A new request is required.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use kyc_core::{SubjectAddress, ValidationError, VerificationStatus};
use kyc_ledger::LedgerError;
use kyc_multisig::{MultisigError, SignerError};

use crate::mirror::MirrorError;

/// Which of the three caller-visible situations a failure represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Did not happen.
    NotApplied,
    /// Happened or may have happened; not yet visible.
    PendingVisibility,
    /// Happened and failed for good.
    FailedPermanently,
}

/// Failure of a reconciliation service entry point.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed request; nothing reached the ledger.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The subject has no record on the ledger.
    #[error("{0} has no verification record")]
    NotRegistered(SubjectAddress),

    /// The requested status change is not allowed from the current status.
    #[error("{subject} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Subject.
        subject: SubjectAddress,
        /// Current status.
        from: VerificationStatus,
        /// Requested status.
        to: VerificationStatus,
    },

    /// A direct ledger call failed.
    #[error("{operation} failed: {source}")]
    Ledger {
        /// Contract function or query attempted.
        operation: &'static str,
        /// Underlying failure.
        source: LedgerError,
    },

    /// The multisig coordinator refused or failed the request.
    #[error(transparent)]
    Multisig(#[from] MultisigError),

    /// The mirror store failed.
    #[error(transparent)]
    Mirror(#[from] MirrorError),
}

impl ServiceError {
    pub(crate) fn ledger(operation: &'static str, source: LedgerError) -> Self {
        Self::Ledger { operation, source }
    }

    /// Classify the failure for the caller.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Validation(_)
            | Self::NotRegistered(_)
            | Self::InvalidTransition { .. }
            | Self::Mirror(_) => Disposition::NotApplied,
            Self::Ledger { source, .. } if source.is_ambiguous() => Disposition::PendingVisibility,
            Self::Ledger { .. } => Disposition::NotApplied,
            Self::Multisig(e) => match e {
                MultisigError::ExecutionReverted { .. }
                | MultisigError::Signer(SignerError::ProposalExpired(_)) => {
                    Disposition::FailedPermanently
                }
                MultisigError::Signer(SignerError::QuorumAlreadyReached(_)) => {
                    Disposition::PendingVisibility
                }
                _ => Disposition::NotApplied,
            },
        }
    }

    /// Stable error code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotRegistered(_) => "not_registered",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Ledger { source, .. } => match source {
                LedgerError::Unreachable { .. } => "ledger_unreachable",
                LedgerError::Reverted { .. } => "ledger_reverted",
                LedgerError::Timeout { .. } => "ledger_timeout",
                LedgerError::Encoding(_) => "ledger_encoding",
            },
            Self::Multisig(e) => match e {
                MultisigError::Signer(SignerError::InvalidSigner(_)) => "invalid_signer",
                MultisigError::Signer(SignerError::DuplicateSignature { .. }) => "duplicate_signature",
                MultisigError::Signer(SignerError::ProposalExpired(_)) => "proposal_expired",
                MultisigError::Signer(SignerError::ProposalAlreadyTerminal { .. }) => {
                    "proposal_already_terminal"
                }
                MultisigError::Signer(SignerError::QuorumAlreadyReached(_)) => "quorum_already_reached",
                MultisigError::Signer(SignerError::UnknownProposal(_)) => "unknown_proposal",
                MultisigError::Signer(SignerError::InvalidThreshold { .. }) => "invalid_threshold",
                MultisigError::Validation(_) => "validation_error",
                MultisigError::DirectoryUnavailable(_) => "ledger_unreachable",
                MultisigError::ExecutionReverted { .. } => "ledger_reverted",
                MultisigError::ExecutionNotApplied { .. } => "execution_not_applied",
            },
            Self::Mirror(_) => "mirror_unavailable",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::ProposalId;
    use kyc_ledger::ContractId;

    #[test]
    fn three_dispositions_are_distinguished() {
        let unreachable = ServiceError::ledger(
            "storeKycData",
            LedgerError::Unreachable {
                contract: ContractId::DataStorage,
                reason: "connection refused".into(),
            },
        );
        assert_eq!(unreachable.disposition(), Disposition::NotApplied);

        let timeout = ServiceError::ledger(
            "storeKycData",
            LedgerError::Timeout {
                contract: ContractId::DataStorage,
                tx_hash: None,
            },
        );
        assert_eq!(timeout.disposition(), Disposition::PendingVisibility);

        let reverted = ServiceError::Multisig(MultisigError::ExecutionReverted {
            proposal: ProposalId::new(),
            reason: "invalid status transition".into(),
        });
        assert_eq!(reverted.disposition(), Disposition::FailedPermanently);
        assert_eq!(reverted.code(), "ledger_reverted");
    }

    #[test]
    fn signer_refusals_did_not_happen() {
        let err = ServiceError::from(MultisigError::from(SignerError::DuplicateSignature {
            proposal: ProposalId::new(),
            signer: kyc_core::SignerId::new("0x0000000000000000000000000000000000000001").unwrap(),
        }));
        assert_eq!(err.disposition(), Disposition::NotApplied);
        assert_eq!(err.code(), "duplicate_signature");
    }
}
