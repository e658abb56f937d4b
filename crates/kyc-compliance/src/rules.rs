//! # Rule Evaluation
//!
//! [`evaluate_rules`] is a pure function of (record, requested jurisdiction,
//! rule set, evaluation time). Rules are checked in a fixed order so the
//! `reasons` sequence is deterministic.

use serde::{Deserialize, Serialize};

use kyc_core::{JurisdictionCode, RiskScore, Timestamp, VerificationRecord, VerificationStatus};
use kyc_ledger::JurisdictionRuleSet;

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleViolation {
    /// The ledger holds no rule set for the requested code.
    UnsupportedJurisdiction {
        /// Code as requested.
        requested: String,
    },
    /// The record was verified under a different jurisdiction.
    JurisdictionMismatch {
        /// Jurisdiction on the record.
        record: JurisdictionCode,
        /// Jurisdiction requested.
        requested: JurisdictionCode,
    },
    /// The rule set requires an approved record.
    RecordInactive {
        /// Current status.
        status: VerificationStatus,
    },
    /// Risk score above the jurisdiction's ceiling.
    RiskScoreTooHigh {
        /// Record's score.
        score: RiskScore,
        /// Highest passing score.
        max: RiskScore,
    },
    /// The rule set requires documents and none are referenced.
    MissingDocuments,
    /// The record was last updated longer ago than allowed.
    RecordExpired {
        /// Days since last update.
        age_days: i64,
        /// Maximum age.
        max_days: u32,
    },
}

impl RuleViolation {
    /// Stable rule code for API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedJurisdiction { .. } => "unsupported_jurisdiction",
            Self::JurisdictionMismatch { .. } => "jurisdiction_mismatch",
            Self::RecordInactive { .. } => "record_inactive",
            Self::RiskScoreTooHigh { .. } => "risk_score_too_high",
            Self::MissingDocuments => "missing_documents",
            Self::RecordExpired { .. } => "record_expired",
        }
    }
}

impl std::fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedJurisdiction { requested } => {
                write!(f, "jurisdiction {requested} is not supported")
            }
            Self::JurisdictionMismatch { record, requested } => {
                write!(f, "record verified under {record}, requested {requested}")
            }
            Self::RecordInactive { status } => write!(f, "record status is {status}"),
            Self::RiskScoreTooHigh { score, max } => {
                write!(f, "risk score {score} exceeds maximum {max}")
            }
            Self::MissingDocuments => f.write_str("no document reference on record"),
            Self::RecordExpired { age_days, max_days } => {
                write!(f, "record is {age_days} days old, maximum {max_days}")
            }
        }
    }
}

/// Outcome of evaluating one record against one jurisdiction.
///
/// Derived and never persisted: rule sets may change between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceResult {
    /// Jurisdiction as requested.
    pub jurisdiction: String,
    /// True iff `reasons` is empty.
    pub passed: bool,
    /// Violations, in rule order.
    pub reasons: Vec<RuleViolation>,
}

impl ComplianceResult {
    fn from_reasons(jurisdiction: String, reasons: Vec<RuleViolation>) -> Self {
        Self {
            jurisdiction,
            passed: reasons.is_empty(),
            reasons,
        }
    }

    /// Negative result for a code the ledger does not know.
    pub fn unsupported(requested: &str) -> Self {
        Self::from_reasons(
            requested.to_string(),
            vec![RuleViolation::UnsupportedJurisdiction {
                requested: requested.to_string(),
            }],
        )
    }
}

/// Evaluate `record` for `jurisdiction` under `rules`.
///
/// `rules` is `None` when the ledger has no rule set for the code, which
/// yields a single `UnsupportedJurisdiction` reason.
pub fn evaluate_rules(
    record: &VerificationRecord,
    jurisdiction: &JurisdictionCode,
    rules: Option<&JurisdictionRuleSet>,
    now: Timestamp,
) -> ComplianceResult {
    let Some(rules) = rules else {
        return ComplianceResult::unsupported(jurisdiction.as_str());
    };

    let mut reasons = Vec::new();
    if &record.jurisdiction != jurisdiction {
        reasons.push(RuleViolation::JurisdictionMismatch {
            record: record.jurisdiction.clone(),
            requested: jurisdiction.clone(),
        });
    }
    if rules.requires_active && !record.is_active() {
        reasons.push(RuleViolation::RecordInactive {
            status: record.status,
        });
    }
    if record.risk_score > rules.max_risk_score {
        reasons.push(RuleViolation::RiskScoreTooHigh {
            score: record.risk_score,
            max: rules.max_risk_score,
        });
    }
    if rules.requires_documents && record.content_hash.is_placeholder() {
        reasons.push(RuleViolation::MissingDocuments);
    }
    if let Some(max_days) = rules.max_record_age_days {
        let age_days = (*now.as_datetime() - *record.updated_at.as_datetime()).num_days();
        if age_days > i64::from(max_days) {
            reasons.push(RuleViolation::RecordExpired { age_days, max_days });
        }
    }

    ComplianceResult::from_reasons(jurisdiction.as_str().to_string(), reasons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::{ContentHash, SubjectAddress, UserId};
    use proptest::prelude::*;

    const T0: i64 = 1_768_478_400;

    fn record(status: VerificationStatus, score: u32) -> VerificationRecord {
        VerificationRecord {
            subject: SubjectAddress::new("0x0000000000000000000000000000000000000abc").unwrap(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(score).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            status,
            updated_at: Timestamp::from_unix_secs(T0).unwrap(),
        }
    }

    fn rules(max: u32) -> JurisdictionRuleSet {
        JurisdictionRuleSet {
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            max_risk_score: RiskScore::new(max).unwrap(),
            requires_documents: true,
            requires_active: true,
            max_record_age_days: Some(365),
        }
    }

    fn pk() -> JurisdictionCode {
        JurisdictionCode::new("PK").unwrap()
    }

    fn at(days: i64) -> Timestamp {
        Timestamp::from_unix_secs(T0 + days * 86_400).unwrap()
    }

    #[test]
    fn approved_low_risk_record_passes() {
        let r = evaluate_rules(&record(VerificationStatus::Approved, 20), &pk(), Some(&rules(50)), at(10));
        assert!(r.passed);
        assert!(r.reasons.is_empty());
    }

    #[test]
    fn unknown_jurisdiction_is_a_negative_result() {
        let code = JurisdictionCode::new("UNKNOWN_CODE").unwrap();
        let r = evaluate_rules(&record(VerificationStatus::Approved, 20), &code, None, at(0));
        assert!(!r.passed);
        assert_eq!(
            r.reasons,
            vec![RuleViolation::UnsupportedJurisdiction {
                requested: "UNKNOWN_CODE".into()
            }]
        );
    }

    #[test]
    fn reasons_follow_rule_order() {
        let mut rec = record(VerificationStatus::Pending, 90);
        rec.content_hash = ContentHash::new(&format!("0x{}", "0".repeat(64))).unwrap();
        let r = evaluate_rules(&rec, &pk(), Some(&rules(50)), at(400));
        let codes: Vec<_> = r.reasons.iter().map(RuleViolation::code).collect();
        assert_eq!(
            codes,
            vec!["record_inactive", "risk_score_too_high", "missing_documents", "record_expired"]
        );
        assert!(!r.passed);
    }

    #[test]
    fn mismatched_jurisdiction_is_reported() {
        let mut rs = rules(50);
        rs.jurisdiction = JurisdictionCode::new("AE").unwrap();
        let ae = JurisdictionCode::new("AE").unwrap();
        let r = evaluate_rules(&record(VerificationStatus::Approved, 20), &ae, Some(&rs), at(0));
        assert_eq!(r.reasons[0].code(), "jurisdiction_mismatch");
    }

    proptest! {
        #[test]
        fn passed_iff_no_reasons(score in 0u32..=100, max in 0u32..=100, days in 0i64..800) {
            let r = evaluate_rules(
                &record(VerificationStatus::Approved, score),
                &pk(),
                Some(&rules(max)),
                at(days),
            );
            prop_assert_eq!(r.passed, r.reasons.is_empty());
            prop_assert_eq!(r.passed, score <= max && days <= 365);
        }
    }
}
