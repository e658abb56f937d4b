//! # Ledger Operations
//!
//! Closed sets of write operations and read queries, one variant per contract
//! function. Every variant carries a fixed, validated field set: the only way
//! to build a malformed operation is to fail constructing one of its
//! `kyc-core` newtypes first.
//!
//! Each write also knows how to confirm itself: [`LedgerOperation::confirmation_query`]
//! names the read that reveals whether the write took effect, and
//! [`LedgerOperation::is_reflected_in`] checks the read result. This is what
//! resolves an ambiguous (timed out) write without issuing a duplicate.

use std::num::NonZeroU8;

use serde::{Deserialize, Serialize};

use kyc_core::{
    ActionKind, ActionOutcome, ContentDigest, ContentHash, EventId, JurisdictionCode, RiskScore,
    SignerId, SubjectAddress, UserId, VerificationRecord, VerificationStatus,
};

use crate::contract::ContractId;
use crate::error::LedgerError;

// ---------------------------------------------------------------------------
// Supporting payload types
// ---------------------------------------------------------------------------

/// Target status of a privileged status update.
///
/// `Pending` is only ever set by `storeKycData`, so it is not representable
/// here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// Pending -> Approved.
    Approved,
    /// Pending -> Rejected.
    Rejected,
    /// Approved -> Revoked.
    Revoked,
}

impl DecisionStatus {
    /// The stored status this decision produces.
    pub fn status(&self) -> VerificationStatus {
        match self {
            Self::Approved => VerificationStatus::Approved,
            Self::Rejected => VerificationStatus::Rejected,
            Self::Revoked => VerificationStatus::Revoked,
        }
    }

    /// Audit action recorded for the decision.
    pub fn action(&self) -> ActionKind {
        match self {
            Self::Approved => ActionKind::KycApproved,
            Self::Rejected => ActionKind::KycRejected,
            Self::Revoked => ActionKind::KycRevoked,
        }
    }

    /// Whether the ledger accepts this decision for a record in `from`.
    pub fn allowed_from(&self, from: VerificationStatus) -> bool {
        matches!(
            (from, self),
            (VerificationStatus::Pending, Self::Approved)
                | (VerificationStatus::Pending, Self::Rejected)
                | (VerificationStatus::Approved, Self::Revoked)
        )
    }
}

impl TryFrom<VerificationStatus> for DecisionStatus {
    type Error = kyc_core::ValidationError;

    fn try_from(status: VerificationStatus) -> Result<Self, Self::Error> {
        match status {
            VerificationStatus::Approved => Ok(Self::Approved),
            VerificationStatus::Rejected => Ok(Self::Rejected),
            VerificationStatus::Revoked => Ok(Self::Revoked),
            VerificationStatus::Pending => Err(kyc_core::ValidationError::InvalidField {
                field: "status",
                reason: "PENDING cannot be set by a status update".into(),
            }),
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.status().fmt(f)
    }
}

/// Rule set for one jurisdiction, as stored by the compliance checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionRuleSet {
    /// Jurisdiction the rules apply to.
    pub jurisdiction: JurisdictionCode,
    /// Highest risk score that still passes.
    pub max_risk_score: RiskScore,
    /// Whether a document content reference is mandatory.
    pub requires_documents: bool,
    /// Whether the record must be in the active (approved) status.
    pub requires_active: bool,
    /// Maximum age of the last record update, in days. `None` means no limit.
    pub max_record_age_days: Option<u32>,
}

/// Payload of one audit log append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id; the audit log contract ignores a repeated id.
    pub event_id: EventId,
    /// Address recorded as actor.
    pub actor: [u8; 20],
    /// Subject the action concerned.
    pub subject: SubjectAddress,
    /// What happened.
    pub action: ActionKind,
    /// Digest of the record state the action replaced, if any.
    pub prior_state: Option<ContentDigest>,
    /// How the triggering write reached the ledger.
    pub outcome: ActionOutcome,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// A state-changing contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LedgerOperation {
    /// `DataStorage.storeKycData`. Creates or replaces a non-approved record
    /// with status `Pending`.
    StoreKycData {
        /// Subject wallet.
        subject: SubjectAddress,
        /// Off-chain account id.
        user_id: UserId,
        /// Document reference.
        content_hash: ContentHash,
        /// Initial risk score.
        risk_score: RiskScore,
        /// Jurisdiction of verification.
        jurisdiction: JurisdictionCode,
    },
    /// `DataStorage.updateKycStatus`. Privileged.
    UpdateKycStatus {
        /// Subject wallet.
        subject: SubjectAddress,
        /// New status.
        status: DecisionStatus,
    },
    /// `DataStorage.updateRiskScore`.
    UpdateRiskScore {
        /// Subject wallet.
        subject: SubjectAddress,
        /// New score.
        risk_score: RiskScore,
    },
    /// `AuditLog.appendEntry`.
    AppendAuditEntry(AuditEntry),
    /// `ComplianceChecker.setJurisdictionRules`. Privileged.
    SetJurisdictionRules(JurisdictionRuleSet),
    /// `MultisigManager.addSigner`. Privileged.
    AddSigner {
        /// Signer to authorize.
        signer: SignerId,
    },
    /// `MultisigManager.removeSigner`. Privileged.
    RemoveSigner {
        /// Signer to deauthorize.
        signer: SignerId,
    },
    /// `MultisigManager.setThreshold`. Privileged.
    SetThreshold {
        /// New quorum size.
        threshold: NonZeroU8,
    },
}

impl LedgerOperation {
    /// Contract the operation is sent to.
    pub fn contract(&self) -> ContractId {
        match self {
            Self::StoreKycData { .. } | Self::UpdateKycStatus { .. } | Self::UpdateRiskScore { .. } => {
                ContractId::DataStorage
            }
            Self::AppendAuditEntry(_) => ContractId::AuditLog,
            Self::SetJurisdictionRules(_) => ContractId::ComplianceChecker,
            Self::AddSigner { .. } | Self::RemoveSigner { .. } | Self::SetThreshold { .. } => {
                ContractId::MultisigManager
            }
        }
    }

    /// Contract function name, for logs.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::StoreKycData { .. } => "storeKycData",
            Self::UpdateKycStatus { .. } => "updateKycStatus",
            Self::UpdateRiskScore { .. } => "updateRiskScore",
            Self::AppendAuditEntry(_) => "appendEntry",
            Self::SetJurisdictionRules(_) => "setJurisdictionRules",
            Self::AddSigner { .. } => "addSigner",
            Self::RemoveSigner { .. } => "removeSigner",
            Self::SetThreshold { .. } => "setThreshold",
        }
    }

    /// Whether the operation may only execute through a multisig quorum.
    pub fn is_privileged(&self) -> bool {
        matches!(
            self,
            Self::UpdateKycStatus { .. }
                | Self::SetJurisdictionRules(_)
                | Self::AddSigner { .. }
                | Self::RemoveSigner { .. }
                | Self::SetThreshold { .. }
        )
    }

    /// Subject whose record the operation mutates, if any.
    pub fn subject(&self) -> Option<&SubjectAddress> {
        match self {
            Self::StoreKycData { subject, .. }
            | Self::UpdateKycStatus { subject, .. }
            | Self::UpdateRiskScore { subject, .. } => Some(subject),
            Self::AppendAuditEntry(entry) => Some(&entry.subject),
            _ => None,
        }
    }

    /// Audit action kind produced by a confirmed write of this operation.
    /// Audit appends themselves produce none.
    pub fn action(&self) -> Option<ActionKind> {
        match self {
            Self::StoreKycData { .. } => Some(ActionKind::KycSubmitted),
            Self::UpdateKycStatus { status, .. } => Some(status.action()),
            Self::UpdateRiskScore { .. } => Some(ActionKind::RiskScoreUpdated),
            Self::AppendAuditEntry(_) => None,
            Self::SetJurisdictionRules(_) => Some(ActionKind::JurisdictionRulesChanged),
            Self::AddSigner { .. } => Some(ActionKind::SignerAdded),
            Self::RemoveSigner { .. } => Some(ActionKind::SignerRemoved),
            Self::SetThreshold { .. } => Some(ActionKind::ThresholdChanged),
        }
    }

    /// The read that reveals whether this write has taken effect.
    pub fn confirmation_query(&self) -> LedgerQuery {
        match self {
            Self::StoreKycData { subject, .. }
            | Self::UpdateKycStatus { subject, .. }
            | Self::UpdateRiskScore { subject, .. } => LedgerQuery::GetVerification {
                subject: subject.clone(),
            },
            Self::AppendAuditEntry(entry) => LedgerQuery::AuditEntryExists {
                event_id: entry.event_id,
            },
            Self::SetJurisdictionRules(rules) => LedgerQuery::GetJurisdictionRules {
                jurisdiction: rules.jurisdiction.clone(),
            },
            Self::AddSigner { .. } | Self::RemoveSigner { .. } => LedgerQuery::GetSigners,
            Self::SetThreshold { .. } => LedgerQuery::GetThreshold,
        }
    }

    /// Whether `value` (the result of [`Self::confirmation_query`]) shows
    /// this write as applied.
    pub fn is_reflected_in(&self, value: &LedgerValue) -> bool {
        match (self, value) {
            (
                Self::StoreKycData {
                    user_id,
                    content_hash,
                    risk_score,
                    jurisdiction,
                    ..
                },
                LedgerValue::Verification(Some(record)),
            ) => {
                record.status == VerificationStatus::Pending
                    && &record.user_id == user_id
                    && &record.content_hash == content_hash
                    && record.risk_score == *risk_score
                    && &record.jurisdiction == jurisdiction
            }
            (Self::UpdateKycStatus { status, .. }, LedgerValue::Verification(Some(record))) => {
                record.status == status.status()
            }
            (Self::UpdateRiskScore { risk_score, .. }, LedgerValue::Verification(Some(record))) => {
                record.risk_score == *risk_score
            }
            (Self::AppendAuditEntry(_), LedgerValue::Flag(exists)) => *exists,
            (Self::SetJurisdictionRules(rules), LedgerValue::Rules(Some(stored))) => stored == rules,
            (Self::AddSigner { signer }, LedgerValue::Signers(set)) => set.contains(signer),
            (Self::RemoveSigner { signer }, LedgerValue::Signers(set)) => !set.contains(signer),
            (Self::SetThreshold { threshold }, LedgerValue::Threshold(t)) => *t == threshold.get(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// A read-only contract call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum LedgerQuery {
    /// `DataStorage.getKycData`.
    GetVerification {
        /// Subject wallet.
        subject: SubjectAddress,
    },
    /// `AuditLog.entryExists`.
    AuditEntryExists {
        /// Event id.
        event_id: EventId,
    },
    /// `ComplianceChecker.getJurisdictionRules`.
    GetJurisdictionRules {
        /// Jurisdiction code.
        jurisdiction: JurisdictionCode,
    },
    /// `MultisigManager.getSigners`.
    GetSigners,
    /// `MultisigManager.threshold`.
    GetThreshold,
}

impl LedgerQuery {
    /// Contract the query is sent to.
    pub fn contract(&self) -> ContractId {
        match self {
            Self::GetVerification { .. } => ContractId::DataStorage,
            Self::AuditEntryExists { .. } => ContractId::AuditLog,
            Self::GetJurisdictionRules { .. } => ContractId::ComplianceChecker,
            Self::GetSigners | Self::GetThreshold => ContractId::MultisigManager,
        }
    }

    /// Contract function name, for logs.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::GetVerification { .. } => "getKycData",
            Self::AuditEntryExists { .. } => "entryExists",
            Self::GetJurisdictionRules { .. } => "getJurisdictionRules",
            Self::GetSigners => "getSigners",
            Self::GetThreshold => "threshold",
        }
    }
}

/// Decoded result of a [`LedgerQuery`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LedgerValue {
    /// Verification record, `None` if the subject is unregistered.
    Verification(Option<VerificationRecord>),
    /// Rules, `None` if the jurisdiction is not supported.
    Rules(Option<JurisdictionRuleSet>),
    /// Current authorized signer set.
    Signers(Vec<SignerId>),
    /// Current quorum size.
    Threshold(u8),
    /// Boolean result.
    Flag(bool),
}

impl LedgerValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Verification(_) => "verification",
            Self::Rules(_) => "rules",
            Self::Signers(_) => "signers",
            Self::Threshold(_) => "threshold",
            Self::Flag(_) => "flag",
        }
    }

    fn mismatch(self, expected: &str) -> LedgerError {
        LedgerError::Encoding(format!("expected {expected} value, got {}", self.kind()))
    }

    /// Unwrap a verification result.
    pub fn into_verification(self) -> Result<Option<VerificationRecord>, LedgerError> {
        match self {
            Self::Verification(v) => Ok(v),
            other => Err(other.mismatch("verification")),
        }
    }

    /// Unwrap a rules result.
    pub fn into_rules(self) -> Result<Option<JurisdictionRuleSet>, LedgerError> {
        match self {
            Self::Rules(r) => Ok(r),
            other => Err(other.mismatch("rules")),
        }
    }

    /// Unwrap a signer set.
    pub fn into_signers(self) -> Result<Vec<SignerId>, LedgerError> {
        match self {
            Self::Signers(s) => Ok(s),
            other => Err(other.mismatch("signers")),
        }
    }

    /// Unwrap a threshold.
    pub fn into_threshold(self) -> Result<u8, LedgerError> {
        match self {
            Self::Threshold(t) => Ok(t),
            other => Err(other.mismatch("threshold")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::Timestamp;

    fn subject() -> SubjectAddress {
        SubjectAddress::new("0x0000000000000000000000000000000000000abc").unwrap()
    }

    fn record(status: VerificationStatus) -> VerificationRecord {
        VerificationRecord {
            subject: subject(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(20).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            status,
            updated_at: Timestamp::from_unix_secs(1_768_478_400).unwrap(),
        }
    }

    #[test]
    fn pending_is_not_a_decision() {
        assert!(DecisionStatus::try_from(VerificationStatus::Pending).is_err());
        assert_eq!(
            DecisionStatus::try_from(VerificationStatus::Revoked).unwrap(),
            DecisionStatus::Revoked
        );
    }

    #[test]
    fn decision_transitions() {
        use VerificationStatus::*;
        assert!(DecisionStatus::Approved.allowed_from(Pending));
        assert!(DecisionStatus::Rejected.allowed_from(Pending));
        assert!(DecisionStatus::Revoked.allowed_from(Approved));
        assert!(!DecisionStatus::Approved.allowed_from(Rejected));
        assert!(!DecisionStatus::Revoked.allowed_from(Pending));
        assert!(!DecisionStatus::Approved.allowed_from(Approved));
    }

    #[test]
    fn privileged_classification() {
        let store = LedgerOperation::StoreKycData {
            subject: subject(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(10).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
        };
        let approve = LedgerOperation::UpdateKycStatus {
            subject: subject(),
            status: DecisionStatus::Approved,
        };
        assert!(!store.is_privileged());
        assert!(approve.is_privileged());
        assert_eq!(store.contract(), ContractId::DataStorage);
        assert_eq!(approve.action(), Some(ActionKind::KycApproved));
        assert!(LedgerOperation::SetThreshold {
            threshold: NonZeroU8::new(2).unwrap()
        }
        .is_privileged());
    }

    #[test]
    fn confirmation_checks_written_fields() {
        let approve = LedgerOperation::UpdateKycStatus {
            subject: subject(),
            status: DecisionStatus::Approved,
        };
        assert_eq!(
            approve.confirmation_query(),
            LedgerQuery::GetVerification { subject: subject() }
        );
        assert!(!approve.is_reflected_in(&LedgerValue::Verification(Some(record(
            VerificationStatus::Pending
        )))));
        assert!(approve.is_reflected_in(&LedgerValue::Verification(Some(record(
            VerificationStatus::Approved
        )))));
        assert!(!approve.is_reflected_in(&LedgerValue::Verification(None)));
        assert!(!approve.is_reflected_in(&LedgerValue::Flag(true)));
    }

    #[test]
    fn stored_data_is_reflected_only_by_a_pending_record() {
        let store = LedgerOperation::StoreKycData {
            subject: subject(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(20).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
        };
        assert!(store.is_reflected_in(&LedgerValue::Verification(Some(record(
            VerificationStatus::Pending
        )))));
        // Same documents, but the ledger still holds the earlier decision.
        assert!(!store.is_reflected_in(&LedgerValue::Verification(Some(record(
            VerificationStatus::Rejected
        )))));

        let mut rescored = record(VerificationStatus::Pending);
        rescored.risk_score = RiskScore::new(60).unwrap();
        assert!(!store.is_reflected_in(&LedgerValue::Verification(Some(rescored))));
    }

    #[test]
    fn value_accessors_reject_mismatch() {
        assert_eq!(LedgerValue::Threshold(2).into_threshold().unwrap(), 2);
        let err = LedgerValue::Flag(true).into_signers().unwrap_err();
        assert!(matches!(err, LedgerError::Encoding(_)));
    }
}
