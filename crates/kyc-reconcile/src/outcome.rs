//! Results returned by the service entry points.

use serde::{Deserialize, Serialize};

use kyc_audit::{AuditStatistics, RepairReport};
use kyc_core::{EventId, ProposalId, SubjectAddress, VerificationRecord};

use crate::mirror::MirrorState;

/// Result of a logical operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Confirmed on the ledger and reflected in the mirror.
    Confirmed {
        /// Transaction hash, if known.
        tx_hash: Option<String>,
        /// Ledger record after the write. `None` when the read-back failed
        /// and the mirror was marked stale instead.
        record: Option<VerificationRecord>,
        /// Audit event for the operation.
        audit_event: Option<EventId>,
        /// Whether the audit append failed and awaits repair.
        audit_gap: bool,
    },
    /// A proposal is collecting signatures; nothing was written yet.
    AwaitingSignatures {
        /// Proposal to sign.
        proposal_id: ProposalId,
        /// Valid signatures so far.
        collected: usize,
        /// Required signatures.
        threshold: u8,
    },
    /// Submitted but unconfirmed. The mirror is stale until the sweep
    /// settles it.
    Ambiguous {
        /// Transaction hash, if the node acknowledged submission.
        tx_hash: Option<String>,
        /// Proposal whose execution is unconfirmed, for privileged writes.
        proposal_id: Option<ProposalId>,
    },
    /// The ledger already holds the requested state; nothing was written.
    NoOp {
        /// Current ledger record.
        record: VerificationRecord,
    },
}

impl OperationOutcome {
    /// Whether the requested state is known to be on the ledger.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Confirmed { .. } | Self::NoOp { .. })
    }
}

/// Where a status read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSource {
    /// Fresh mirror entry.
    Mirror,
    /// Ledger read; the mirror was refreshed from it.
    Ledger,
    /// Cached entry served because the ledger was unreachable.
    StaleMirror,
}

/// Verification status of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    /// Subject.
    pub subject: SubjectAddress,
    /// Current record, if the subject is registered.
    pub record: Option<VerificationRecord>,
    /// Where `record` came from.
    pub source: StatusSource,
    /// Mirror freshness after the read.
    pub mirror_state: Option<MirrorState>,
}

/// Result of one reconciliation pass over stale mirror entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stale entries examined.
    pub checked: usize,
    /// Entries refreshed from the ledger.
    pub corrected: usize,
    /// Pending writes found applied on the ledger.
    pub writes_confirmed: usize,
    /// Entries still unsettled.
    pub still_stale: usize,
    /// Entries newly flagged diverged.
    pub diverged: Vec<SubjectAddress>,
}

/// Result of a full sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Mirror reconciliation.
    pub reconcile: ReconcileReport,
    /// Proposals expired.
    pub expired_proposals: usize,
    /// Unconfirmed proposal executions settled.
    pub resolved_executions: usize,
    /// Audit gap repair.
    pub audit_repair: RepairReport,
}

/// Counts derived from the audit index, the coordinator and the mirror.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatistics {
    /// KYC submissions recorded.
    pub submissions: u64,
    /// Approvals executed.
    pub approvals: u64,
    /// Rejections executed.
    pub rejections: u64,
    /// Revocations executed.
    pub revocations: u64,
    /// Risk score updates recorded.
    pub risk_updates: u64,
    /// Proposals not yet terminal.
    pub pending_proposals: usize,
    /// Mirror entries awaiting reconciliation.
    pub stale_subjects: usize,
    /// Full audit index counts.
    pub audit: AuditStatistics,
}
