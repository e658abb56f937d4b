//! # kyc-audit — Audit Recorder
//!
//! Every state-changing action that reached the ledger produces exactly one
//! [`AuditEvent`]. Events are appended to the audit log contract and indexed
//! off-chain for paginated retrieval and derived statistics.
//!
//! Audit durability is best-effort: a failed append is tracked as a gap
//! ([`AuditError::Gap`]) and repaired out of band, never propagated as a
//! failure of the primary action.

pub mod error;
pub mod event;
pub mod query;
pub mod recorder;

pub use error::AuditError;
pub use event::{AuditEvent, WriteProof};
pub use query::{AuditFilter, AuditQuery};
pub use recorder::{AuditRecorder, AuditStatistics, AuditStatus, RepairReport};
