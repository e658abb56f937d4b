//! # kyc-reconcile — Reconciliation Service
//!
//! Drives logical KYC operations (submit, approve, reject, revoke, risk
//! update) through the ledger gateway and the multisig coordinator, keeps
//! the off-chain mirror consistent with the ledger, and runs the periodic
//! sweep that settles unconfirmed writes.
//!
//! - [`service`]: the [`ReconciliationService`] entry points.
//! - [`mirror`]: the [`MirrorStore`] trait and its in-memory implementation.
//! - [`locks`]: per-subject serialization.
//! - [`sweep`]: the background sweep task.
//! - [`risk`]: risk scorer batch ingestion.
//!
//! ## Invariants
//!
//! - The mirror is updated only from a confirmed write or a ledger read.
//! - Operations on one subject are serialized; operations on different
//!   subjects run concurrently.
//! - An unconfirmed write is settled by reading the ledger, never by
//!   re-issuing it.

pub mod config;
pub mod error;
pub mod locks;
pub mod mirror;
pub mod outcome;
pub mod risk;
pub mod service;
pub mod sweep;

pub use config::ServiceConfig;
pub use error::{Disposition, ServiceError};
pub use locks::SubjectLocks;
pub use mirror::{InMemoryMirror, MirrorEntry, MirrorError, MirrorState, MirrorStore, PendingWrite};
pub use outcome::{
    OperationOutcome, ReconcileReport, ServiceStatistics, StatusSource, StatusView, SweepReport,
};
pub use risk::{RiskBatchReport, RiskBatchSummary, RiskUpdate, RiskUpdateStatus, ScoreResult};
pub use service::{KycSubmission, ReconciliationService};
pub use sweep::spawn_sweeper;
