//! Audit recorder errors.

use thiserror::Error;

use kyc_core::EventId;
use kyc_ledger::LedgerError;

/// Failure to record an audit event.
///
/// Never fatal to the triggering operation: the caller logs it and carries
/// on. A `Gap` is kept for [`crate::AuditRecorder::repair_gaps`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The audit log append failed; the event is indexed as a gap.
    #[error("audit gap for {event_id}: {source}")]
    Gap {
        /// Event awaiting repair.
        event_id: EventId,
        /// Underlying ledger failure.
        source: LedgerError,
    },

    /// An event with this id was already recorded.
    #[error("{0} already recorded")]
    Duplicate(EventId),
}
