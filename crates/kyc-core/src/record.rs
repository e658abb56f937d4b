//! # Verification Record
//!
//! The per-subject KYC record. The ledger is the source of truth; the
//! off-chain mirror holds copies of this type and is invalidated on
//! divergence. Records are never deleted, only deactivated.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalBytes;
use crate::digest::{sha256_digest, ContentDigest};
use crate::error::CanonicalizationError;
use crate::identity::{ContentHash, JurisdictionCode, RiskScore, SubjectAddress, UserId};
use crate::temporal::Timestamp;

/// KYC status of a subject as stored by the data storage contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Data submitted, awaiting a multisig decision.
    Pending,
    /// Approved by quorum. The only active status.
    Approved,
    /// Rejected by quorum.
    Rejected,
    /// Previously approved, deactivated by quorum.
    Revoked,
}

impl VerificationStatus {
    /// All statuses in contract code order.
    pub const ALL: [VerificationStatus; 4] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::Revoked,
    ];

    /// `uint8` code used by the data storage contract. `0` means "no record".
    pub fn code(&self) -> u8 {
        match self {
            Self::Pending => 1,
            Self::Approved => 2,
            Self::Rejected => 3,
            Self::Revoked => 4,
        }
    }

    /// Inverse of [`Self::code`]. Returns `None` for `0` and unknown codes.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Whether a record in this status counts as verified.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Revoked => "REVOKED",
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification state of one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    /// Wallet address of the subject.
    pub subject: SubjectAddress,
    /// Off-chain account that submitted the data.
    pub user_id: UserId,
    /// Reference to the stored documents.
    pub content_hash: ContentHash,
    /// Latest risk score.
    pub risk_score: RiskScore,
    /// Jurisdiction the subject was verified under.
    pub jurisdiction: JurisdictionCode,
    /// Current KYC status.
    pub status: VerificationStatus,
    /// Time of the last confirmed ledger mutation.
    pub updated_at: Timestamp,
}

impl VerificationRecord {
    /// Whether the subject is currently verified.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// SHA-256 over the canonical JSON of this record.
    ///
    /// Audit events reference the state a mutation replaced by this digest.
    pub fn digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        Ok(sha256_digest(&CanonicalBytes::new(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VerificationRecord {
        VerificationRecord {
            subject: SubjectAddress::new("0x00000000000000000000000000000000000000ab").unwrap(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new(&format!("0x{}", "11".repeat(32))).unwrap(),
            risk_score: RiskScore::new(20).unwrap(),
            jurisdiction: JurisdictionCode::new("US").unwrap(),
            status: VerificationStatus::Pending,
            updated_at: Timestamp::from_unix_secs(1_768_478_400).unwrap(),
        }
    }

    #[test]
    fn status_codes_round_trip() {
        for s in VerificationStatus::ALL {
            assert_eq!(VerificationStatus::from_code(s.code()), Some(s));
        }
        assert_eq!(VerificationStatus::from_code(0), None);
        assert_eq!(VerificationStatus::from_code(9), None);
    }

    #[test]
    fn only_approved_is_active() {
        assert!(VerificationStatus::Approved.is_active());
        assert!(!VerificationStatus::Pending.is_active());
        assert!(!VerificationStatus::Revoked.is_active());
    }

    #[test]
    fn digest_changes_with_status() {
        let a = sample();
        let mut b = sample();
        b.status = VerificationStatus::Approved;
        assert_eq!(a.digest().unwrap(), sample().digest().unwrap());
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn status_serializes_screaming_case() {
        let json = serde_json::to_string(&VerificationStatus::Approved).unwrap();
        assert_eq!(json, "\"APPROVED\"");
    }
}
