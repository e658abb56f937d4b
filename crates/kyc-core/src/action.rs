//! # Action Kinds
//!
//! The closed set of state-changing actions that produce audit events.
//! Shared by the ledger encoding (the audit log contract stores the action
//! code) and the audit recorder.

use serde::{Deserialize, Serialize};

use crate::identity::{SignerId, SubjectAddress};

/// A state-changing action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// KYC data stored for a subject.
    KycSubmitted,
    /// Subject approved by quorum.
    KycApproved,
    /// Subject rejected by quorum.
    KycRejected,
    /// Approval withdrawn by quorum.
    KycRevoked,
    /// Risk score updated from a scorer batch.
    RiskScoreUpdated,
    /// Signer added to the multisig manager.
    SignerAdded,
    /// Signer removed from the multisig manager.
    SignerRemoved,
    /// Signature threshold changed.
    ThresholdChanged,
    /// Jurisdiction rule set created or replaced.
    JurisdictionRulesChanged,
}

impl ActionKind {
    /// Every action kind.
    pub const ALL: [ActionKind; 9] = [
        Self::KycSubmitted,
        Self::KycApproved,
        Self::KycRejected,
        Self::KycRevoked,
        Self::RiskScoreUpdated,
        Self::SignerAdded,
        Self::SignerRemoved,
        Self::ThresholdChanged,
        Self::JurisdictionRulesChanged,
    ];

    /// Wire string, as stored by the audit log contract.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KycSubmitted => "kyc_submitted",
            Self::KycApproved => "kyc_approved",
            Self::KycRejected => "kyc_rejected",
            Self::KycRevoked => "kyc_revoked",
            Self::RiskScoreUpdated => "risk_score_updated",
            Self::SignerAdded => "signer_added",
            Self::SignerRemoved => "signer_removed",
            Self::ThresholdChanged => "threshold_changed",
            Self::JurisdictionRulesChanged => "jurisdiction_rules_changed",
        }
    }

    /// Parse a wire string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the action reached the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Write confirmed directly.
    Applied,
    /// Write timed out and was later found applied by a reconciliation read.
    Reconciled,
}

impl ActionOutcome {
    /// Wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Reconciled => "reconciled",
        }
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who caused an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// The subject acting on their own record (KYC submission).
    Subject {
        /// Subject wallet.
        address: SubjectAddress,
    },
    /// A single authorized signer.
    Signer {
        /// Signer wallet.
        signer: SignerId,
    },
    /// A quorum of signers, in signature arrival order.
    Quorum {
        /// Signers whose signatures executed the proposal.
        signers: Vec<SignerId>,
    },
    /// Internal jobs (risk scoring batches, reconciliation).
    System,
}

impl Actor {
    /// The 20-byte address the audit log contract records as actor.
    ///
    /// A quorum is recorded as the signer whose signature crossed the
    /// threshold; `System` as the zero address.
    pub fn ledger_address(&self) -> [u8; 20] {
        match self {
            Self::Subject { address } => address.to_bytes(),
            Self::Signer { signer } => signer.to_bytes(),
            Self::Quorum { signers } => signers.last().map(SignerId::to_bytes).unwrap_or([0u8; 20]),
            Self::System => [0u8; 20],
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subject { address } => write!(f, "subject:{address}"),
            Self::Signer { signer } => write!(f, "signer:{signer}"),
            Self::Quorum { signers } => write!(f, "quorum:{}", signers.len()),
            Self::System => f.write_str("system"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_records_last_signer() {
        let a = SignerId::new("0x000000000000000000000000000000000000000a").unwrap();
        let b = SignerId::new("0x000000000000000000000000000000000000000b").unwrap();
        let actor = Actor::Quorum {
            signers: vec![a, b.clone()],
        };
        assert_eq!(actor.ledger_address(), b.to_bytes());
        assert_eq!(Actor::System.ledger_address(), [0u8; 20]);
    }

    #[test]
    fn wire_strings_parse_back() {
        for a in ActionKind::ALL {
            assert_eq!(ActionKind::parse(a.as_str()), Some(a));
        }
        assert_eq!(ActionKind::parse("kyc_deleted"), None);
    }

    #[test]
    fn serde_matches_wire_string() {
        let json = serde_json::to_string(&ActionKind::ThresholdChanged).unwrap();
        assert_eq!(json, "\"threshold_changed\"");
    }
}
