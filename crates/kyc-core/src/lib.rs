//! # kyc-core — Foundational Types for the KYC Ledger Sync Stack
//!
//! Every other crate in the workspace depends on `kyc-core`; it depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `SubjectAddress`, `SignerId`,
//!    `UserId`, `JurisdictionCode`, `ContentHash`, `RiskScore` are newtypes with
//!    validated constructors. A malformed wallet address never reaches the
//!    ledger because it cannot be constructed.
//!
//! 2. **`CanonicalBytes` newtype.** All digest computation flows through
//!    `CanonicalBytes::new()`, so the prior-state references stored in audit
//!    events are reproducible byte-for-byte.
//!
//! 3. **UTC-only timestamps and an injectable [`Clock`].** Proposal expiry and
//!    reconciliation bookkeeping read time through the clock so tests can
//!    advance it deterministically.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `kyc-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod action;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod record;
pub mod temporal;

pub use action::{ActionKind, ActionOutcome, Actor};
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, ContentDigest};
pub use error::{CanonicalizationError, ValidationError};
pub use identity::{
    normalize_address, ContentHash, EventId, JurisdictionCode, ProposalId, RiskScore, SignerId,
    SubjectAddress, UserId,
};
pub use record::{VerificationRecord, VerificationStatus};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
