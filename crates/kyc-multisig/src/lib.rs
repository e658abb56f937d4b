//! # kyc-multisig — Multisig Coordinator
//!
//! Privileged ledger operations (status decisions, signer set changes,
//! threshold and jurisdiction rule changes) execute only once a quorum of
//! authorized signers has signed a [`MultisigProposal`].
//!
//! - [`proposal`]: the per-proposal state machine, pure and clock-free.
//! - [`directory`]: the authorized signer set, read fresh per signature.
//! - [`coordinator`]: proposal storage, per-proposal serialization,
//!   execution through the ledger gateway and audit recording.
//!
//! ## Invariants
//!
//! - A proposal never executes with fewer valid signatures than the
//!   threshold current at the final signature.
//! - A signer contributes at most once per proposal.
//! - Terminal proposals (`Executed`, `Failed`, `Expired`, `Rejected`) never
//!   transition again.
//! - A reverted execution is never retried.

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod proposal;

pub use coordinator::{CoordinatorConfig, MultisigCoordinator, ProposeOutcome, SignOutcome};
pub use directory::{LedgerSignerDirectory, SignerDirectory, SignerSnapshot};
pub use error::{MultisigError, SignerError};
pub use proposal::{
    InFlightExecution, MultisigProposal, PrivilegedOperation, ProposalStatus, Signature,
    SignatureProgress,
};
