//! # Audit Recorder
//!
//! Appends every [`AuditEvent`] to the audit log contract and keeps an
//! off-chain index of what was recorded. The index backs [`AuditQuery`],
//! the derived [`AuditStatistics`] and gap repair.
//!
//! ## Durability
//!
//! Recording is best-effort. When the append fails the event is still
//! indexed, flagged [`AuditStatus::Gap`], and [`AuditError::Gap`] is
//! returned. The triggering operation is never rolled back.
//! [`AuditRecorder::repair_gaps`] re-attempts the appends later; the audit
//! log contract ignores a repeated event id, so a repair after an ambiguous
//! append cannot duplicate an entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use kyc_core::{ActionKind, EventId, SubjectAddress};
use kyc_ledger::{LedgerError, LedgerGateway, LedgerOperation};

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::query::{AuditFilter, AuditQuery};

/// Ledger status of an indexed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Appended to the audit log contract.
    Recorded,
    /// Append failed; awaiting repair.
    Gap,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexedEvent {
    pub(crate) event: AuditEvent,
    pub(crate) status: AuditStatus,
}

#[derive(Debug, Default)]
pub(crate) struct AuditIndex {
    pub(crate) events: Vec<IndexedEvent>,
    positions: HashMap<EventId, usize>,
}

impl AuditIndex {
    fn insert(&mut self, event: AuditEvent, status: AuditStatus) {
        self.positions.insert(event.id, self.events.len());
        self.events.push(IndexedEvent { event, status });
    }

    fn set_status(&mut self, id: &EventId, status: AuditStatus) {
        if let Some(&pos) = self.positions.get(id) {
            if let Some(entry) = self.events.get_mut(pos) {
                entry.status = status;
            }
        }
    }
}

/// Counts derived from the audit index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatistics {
    /// Events indexed, gaps included.
    pub total_events: u64,
    /// Events per action kind.
    pub by_action: BTreeMap<ActionKind, u64>,
    /// Distinct subjects with at least one event.
    pub subjects: u64,
    /// Events still awaiting repair.
    pub open_gaps: u64,
}

impl AuditStatistics {
    /// Count for one action kind.
    pub fn count(&self, action: ActionKind) -> u64 {
        self.by_action.get(&action).copied().unwrap_or(0)
    }
}

/// Result of a [`AuditRecorder::repair_gaps`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Gaps attempted.
    pub attempted: usize,
    /// Gaps closed.
    pub repaired: usize,
    /// Gaps still open.
    pub remaining: usize,
}

/// Records audit events to the ledger and indexes them off-chain.
///
/// Cloning shares the index.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    gateway: Arc<dyn LedgerGateway>,
    index: Arc<RwLock<AuditIndex>>,
    page_size: usize,
}

impl AuditRecorder {
    /// Default number of events fetched per query page.
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    /// Create a recorder writing through `gateway`.
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self {
            gateway,
            index: Arc::new(RwLock::new(AuditIndex::default())),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the query page size (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Append `event` to the audit log.
    ///
    /// Call only after the triggering write's proof is in hand; the event
    /// type makes that a construction-time requirement.
    pub async fn record(&self, event: AuditEvent) -> Result<EventId, AuditError> {
        let id = event.id;
        if self.index.read().positions.contains_key(&id) {
            return Err(AuditError::Duplicate(id));
        }

        let op = LedgerOperation::AppendAuditEntry(event.to_entry());
        let result = self.append(&op).await;

        let subject = event.subject.clone();
        let action = event.action;
        match result {
            Ok(()) => {
                self.index.write().insert(event, AuditStatus::Recorded);
                tracing::debug!(event_id = %id, %subject, %action, "audit event recorded");
                Ok(id)
            }
            Err(source) => {
                self.index.write().insert(event, AuditStatus::Gap);
                metrics::counter!("kyc_audit_gaps_total").increment(1);
                tracing::warn!(
                    event_id = %id,
                    %subject,
                    %action,
                    error = %source,
                    "audit append failed, event marked as gap"
                );
                Err(AuditError::Gap {
                    event_id: id,
                    source,
                })
            }
        }
    }

    /// One append attempt. A timed-out append counts as recorded only if a
    /// follow-up read finds the entry.
    async fn append(&self, op: &LedgerOperation) -> Result<(), LedgerError> {
        match self.gateway.write(op).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_ambiguous() => match self.gateway.is_applied(op).await {
                Ok(true) => Ok(()),
                Ok(false) | Err(_) => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Lazily page through events for `subject`, oldest first.
    ///
    /// The query sees only events indexed before it was created and yields
    /// at most `limit` of them. It cannot be rewound; issue a new query to
    /// start over.
    pub fn query(&self, subject: &SubjectAddress, limit: usize, filter: AuditFilter) -> AuditQuery {
        let end = self.index.read().events.len();
        AuditQuery::new(
            Arc::clone(&self.index),
            subject.clone(),
            filter,
            limit,
            self.page_size,
            end,
        )
    }

    /// Status of an indexed event.
    pub fn status(&self, id: &EventId) -> Option<AuditStatus> {
        let index = self.index.read();
        index
            .positions
            .get(id)
            .and_then(|&pos| index.events.get(pos))
            .map(|e| e.status)
    }

    /// Ids of events awaiting repair.
    pub fn gaps(&self) -> Vec<EventId> {
        self.index
            .read()
            .events
            .iter()
            .filter(|e| e.status == AuditStatus::Gap)
            .map(|e| e.event.id)
            .collect()
    }

    /// Re-attempt the ledger append for every open gap.
    pub async fn repair_gaps(&self) -> RepairReport {
        let pending: Vec<AuditEvent> = self
            .index
            .read()
            .events
            .iter()
            .filter(|e| e.status == AuditStatus::Gap)
            .map(|e| e.event.clone())
            .collect();

        let mut report = RepairReport {
            attempted: pending.len(),
            ..RepairReport::default()
        };
        for event in pending {
            let op = LedgerOperation::AppendAuditEntry(event.to_entry());
            match self.append(&op).await {
                Ok(()) => {
                    self.index.write().set_status(&event.id, AuditStatus::Recorded);
                    report.repaired += 1;
                    tracing::info!(event_id = %event.id, "audit gap repaired");
                }
                Err(e) => {
                    report.remaining += 1;
                    tracing::warn!(event_id = %event.id, error = %e, "audit gap repair failed");
                }
            }
        }
        report
    }

    /// Counts derived from the index.
    pub fn statistics(&self) -> AuditStatistics {
        let index = self.index.read();
        let mut stats = AuditStatistics::default();
        let mut subjects = std::collections::HashSet::new();
        for entry in &index.events {
            stats.total_events += 1;
            *stats.by_action.entry(entry.event.action).or_insert(0) += 1;
            subjects.insert(&entry.event.subject);
            if entry.status == AuditStatus::Gap {
                stats.open_gaps += 1;
            }
        }
        stats.subjects = subjects.len() as u64;
        stats
    }
}
