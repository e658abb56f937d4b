//! # Off-Chain Mirror
//!
//! The mirror caches ledger-derived verification records for fast reads.
//! It is never authoritative: an entry is written only from a confirmed
//! write or from a ledger read, and a write whose confirmation was not
//! observed marks the entry stale instead of updating it.
//!
//! ```text
//!   Fresh ──ambiguous write──▶ Stale ──ledger read settles──▶ Fresh
//!                                │
//!                                └── attempts exhausted ──▶ Diverged (flagged)
//! ```
//!
//! Diverged entries stay on the sweep list; a later settling read clears
//! the flag.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kyc_core::{Actor, ContentDigest, SubjectAddress, Timestamp, VerificationRecord};
use kyc_ledger::LedgerOperation;

/// Freshness of a mirror entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorState {
    /// Matches the ledger as of `synced_at`.
    Fresh,
    /// A write's outcome is unknown; the ledger must be re-read.
    Stale,
    /// Reconciliation could not settle the entry within its attempt budget.
    Diverged,
}

impl MirrorState {
    /// Whether reads must go to the ledger.
    pub fn needs_reconcile(&self) -> bool {
        !matches!(self, Self::Fresh)
    }
}

/// A direct (non-multisig) write whose confirmation was not observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// The submitted operation.
    pub operation: LedgerOperation,
    /// Who requested it.
    pub actor: Actor,
    /// Transaction hash, if the node acknowledged submission.
    pub tx_hash: Option<String>,
    /// Digest of the record the write replaces.
    pub prior_state: Option<ContentDigest>,
    /// Submission time.
    pub submitted_at: Timestamp,
}

/// One subject's cached state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Subject.
    pub subject: SubjectAddress,
    /// Last record read from or confirmed on the ledger.
    pub record: Option<VerificationRecord>,
    /// Freshness.
    pub state: MirrorState,
    /// Unconfirmed direct write, if any.
    pub pending: Option<PendingWrite>,
    /// Reconciliation reads that did not settle the entry.
    pub attempts: u32,
    /// Last time the entry matched the ledger.
    pub synced_at: Option<Timestamp>,
    /// When the entry went stale.
    pub stale_since: Option<Timestamp>,
}

impl MirrorEntry {
    /// Entry matching the ledger at `now`.
    pub fn fresh(record: VerificationRecord, now: Timestamp) -> Self {
        Self {
            subject: record.subject.clone(),
            record: Some(record),
            state: MirrorState::Fresh,
            pending: None,
            attempts: 0,
            synced_at: Some(now),
            stale_since: None,
        }
    }
}

/// Mirror store failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    /// Backend unavailable.
    #[error("mirror store unavailable: {0}")]
    Unavailable(String),
}

/// The off-chain mirror store.
#[async_trait]
pub trait MirrorStore: Send + Sync + std::fmt::Debug {
    /// Entry for `subject`.
    async fn get(&self, subject: &SubjectAddress) -> Result<Option<MirrorEntry>, MirrorError>;

    /// Insert or replace an entry.
    async fn upsert(&self, entry: MirrorEntry) -> Result<(), MirrorError>;

    /// Mark `subject` stale, creating an empty entry if absent. A `pending`
    /// write replaces any previous one; `None` keeps it.
    async fn mark_stale(
        &self,
        subject: &SubjectAddress,
        pending: Option<PendingWrite>,
        at: Timestamp,
    ) -> Result<(), MirrorError>;

    /// Subjects whose entry is stale or diverged.
    async fn list_stale(&self) -> Result<Vec<SubjectAddress>, MirrorError>;
}

/// Process-local mirror.
#[derive(Debug, Default)]
pub struct InMemoryMirror {
    entries: RwLock<HashMap<SubjectAddress, MirrorEntry>>,
}

impl InMemoryMirror {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry count by state.
    pub fn count(&self, state: MirrorState) -> usize {
        self.entries.read().values().filter(|e| e.state == state).count()
    }
}

#[async_trait]
impl MirrorStore for InMemoryMirror {
    async fn get(&self, subject: &SubjectAddress) -> Result<Option<MirrorEntry>, MirrorError> {
        Ok(self.entries.read().get(subject).cloned())
    }

    async fn upsert(&self, entry: MirrorEntry) -> Result<(), MirrorError> {
        self.entries.write().insert(entry.subject.clone(), entry);
        Ok(())
    }

    async fn mark_stale(
        &self,
        subject: &SubjectAddress,
        pending: Option<PendingWrite>,
        at: Timestamp,
    ) -> Result<(), MirrorError> {
        let mut entries = self.entries.write();
        let entry = entries.entry(subject.clone()).or_insert_with(|| MirrorEntry {
            subject: subject.clone(),
            record: None,
            state: MirrorState::Fresh,
            pending: None,
            attempts: 0,
            synced_at: None,
            stale_since: None,
        });
        if entry.state == MirrorState::Fresh {
            entry.stale_since = Some(at);
            entry.attempts = 0;
        }
        entry.state = MirrorState::Stale;
        if pending.is_some() {
            entry.pending = pending;
        }
        Ok(())
    }

    async fn list_stale(&self) -> Result<Vec<SubjectAddress>, MirrorError> {
        let mut stale: Vec<_> = self
            .entries
            .read()
            .values()
            .filter(|e| e.state.needs_reconcile())
            .map(|e| e.subject.clone())
            .collect();
        stale.sort();
        Ok(stale)
    }
}
