//! # Ledger Errors
//!
//! The three transport-level failure kinds every ledger call can produce,
//! plus encoding failures. Business validation never happens here.

use thiserror::Error;

use crate::contract::ContractId;

/// Failure of a ledger read or write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Node or network unavailable. The call did not reach the contract and
    /// may be retried.
    #[error("{contract} unreachable: {reason}")]
    Unreachable {
        /// Target contract.
        contract: ContractId,
        /// Transport-level detail.
        reason: String,
    },

    /// The contract rejected the call. Not retryable.
    #[error("{contract} reverted: {reason}")]
    Reverted {
        /// Target contract.
        contract: ContractId,
        /// Revert reason, verbatim.
        reason: String,
    },

    /// Confirmation was not observed within the bounded window. The
    /// transaction may still confirm; ledger state must be re-read before
    /// any retry.
    #[error("{contract} confirmation timed out (tx {})", tx_hash.as_deref().unwrap_or("unknown"))]
    Timeout {
        /// Target contract.
        contract: ContractId,
        /// Transaction hash, if submission was acknowledged.
        tx_hash: Option<String>,
    },

    /// Request or response could not be encoded/decoded.
    #[error("ledger encoding error: {0}")]
    Encoding(String),
}

impl LedgerError {
    /// Only `Unreachable` may be retried blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    /// Whether the outcome is unknown and requires a confirming read.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Reverted { .. } => "reverted",
            Self::Timeout { .. } => "timeout",
            Self::Encoding(_) => "encoding",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let u = LedgerError::Unreachable {
            contract: ContractId::DataStorage,
            reason: "connection refused".into(),
        };
        let r = LedgerError::Reverted {
            contract: ContractId::DataStorage,
            reason: "subject not registered".into(),
        };
        let t = LedgerError::Timeout {
            contract: ContractId::MultisigManager,
            tx_hash: Some("0xdead".into()),
        };
        assert!(u.is_retryable() && !u.is_ambiguous());
        assert!(!r.is_retryable() && !r.is_ambiguous());
        assert!(!t.is_retryable() && t.is_ambiguous());
        assert_eq!(r.to_string(), "data_storage reverted: subject not registered");
        assert!(t.to_string().contains("0xdead"));
    }
}
