//! # Receipts and Write Outcomes
//!
//! A [`Receipt`] proves a write was confirmed, not merely submitted.
//! [`WriteOutcome`] is the three-valued view callers branch on: confirmed,
//! ambiguous (must re-read before retrying), or failed.

use serde::{Deserialize, Serialize};

use kyc_core::Timestamp;

use crate::contract::ContractId;
use crate::error::LedgerError;

/// Proof of a confirmed ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Contract written to.
    pub contract: ContractId,
    /// Transaction hash.
    pub tx_hash: String,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Time confirmation was observed.
    pub confirmed_at: Timestamp,
}

/// Outcome of a write, with ambiguity made explicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Confirmed on the ledger.
    Confirmed(Receipt),
    /// Submitted but confirmation was not observed in time. The write may
    /// still land.
    Ambiguous {
        /// Contract written to.
        contract: ContractId,
        /// Transaction hash, when the node acknowledged submission.
        tx_hash: Option<String>,
    },
    /// Did not happen (unreachable, reverted, or not encodable).
    Failed(LedgerError),
}

impl WriteOutcome {
    /// Classify a raw gateway result.
    pub fn from_result(result: Result<Receipt, LedgerError>) -> Self {
        match result {
            Ok(receipt) => Self::Confirmed(receipt),
            Err(LedgerError::Timeout { contract, tx_hash }) => Self::Ambiguous { contract, tx_hash },
            Err(e) => Self::Failed(e),
        }
    }

    /// Whether the write is known to have been applied.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }
}
