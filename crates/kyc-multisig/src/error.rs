//! Multisig errors.

use thiserror::Error;

use kyc_core::{ProposalId, SignerId, ValidationError};
use kyc_ledger::LedgerError;

use crate::proposal::ProposalStatus;

/// A signature or proposal request that was refused. None of these mutate
/// proposal state, except that a late signature on an overdue proposal
/// records its expiry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Not in the current authorized signer set.
    #[error("{0} is not an authorized signer")]
    InvalidSigner(SignerId),

    /// Already signed this proposal.
    #[error("{signer} already signed {proposal}")]
    DuplicateSignature {
        /// Proposal.
        proposal: ProposalId,
        /// Repeat signer.
        signer: SignerId,
    },

    /// The proposal's expiry has passed.
    #[error("{0} has expired")]
    ProposalExpired(ProposalId),

    /// The proposal is in a terminal state.
    #[error("{proposal} is already {status}")]
    ProposalAlreadyTerminal {
        /// Proposal.
        proposal: ProposalId,
        /// Its terminal status.
        status: ProposalStatus,
    },

    /// Quorum was reached and execution is under way; the proposal no
    /// longer takes signatures or vetoes.
    #[error("{0} already reached quorum")]
    QuorumAlreadyReached(ProposalId),

    /// No proposal with this id.
    #[error("unknown {0}")]
    UnknownProposal(ProposalId),

    /// The ledger's threshold cannot be met by its signer set.
    #[error("threshold {threshold} is invalid for {signers} signers")]
    InvalidThreshold {
        /// Configured threshold.
        threshold: u8,
        /// Authorized signer count.
        signers: usize,
    },
}

/// Failure of a coordinator operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    /// Request refused; no side effect.
    #[error(transparent)]
    Signer(#[from] SignerError),

    /// The operation is not a privileged one.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Signer set or threshold could not be read; no side effect.
    #[error("signer directory unavailable: {0}")]
    DirectoryUnavailable(LedgerError),

    /// The execution write reverted. The proposal is now `Failed` and will
    /// not be retried.
    #[error("{proposal} execution reverted: {reason}")]
    ExecutionReverted {
        /// Proposal.
        proposal: ProposalId,
        /// Revert reason.
        reason: String,
    },

    /// The execution write did not reach the ledger. The proposal stays
    /// pending with its quorum and can be resolved later.
    #[error("{proposal} execution not applied: {source}")]
    ExecutionNotApplied {
        /// Proposal.
        proposal: ProposalId,
        /// Transport failure.
        source: LedgerError,
    },
}
