//! # Error Types
//!
//! Validation and canonicalization errors shared by every crate. Validation
//! errors are raised at construction time, before anything reaches the
//! ledger.

use thiserror::Error;

/// A domain primitive or request failed validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Wallet address is not `0x` followed by 40 hex characters.
    #[error("invalid address {value:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Off-chain user identifier is empty or too long.
    #[error("invalid user id {0:?}")]
    InvalidUserId(String),

    /// Jurisdiction code does not match the registry format.
    #[error("invalid jurisdiction code {0:?}")]
    InvalidJurisdiction(String),

    /// Content hash is not a recognizable document reference.
    #[error("invalid content hash {0:?}")]
    InvalidContentHash(String),

    /// Risk score outside 0..=100.
    #[error("risk score {0} out of range 0..=100")]
    RiskScoreOutOfRange(u32),

    /// A free-text field (reason, config key) is empty or oversized.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Error during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}
