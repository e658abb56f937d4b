//! Ledger-backed compliance evaluator.

use std::sync::Arc;

use kyc_core::{Clock, JurisdictionCode, VerificationRecord};
use kyc_ledger::{LedgerError, LedgerGateway, LedgerQuery};

use crate::rules::{evaluate_rules, ComplianceResult};

/// Evaluates records against rule sets read from the compliance checker.
///
/// Rule sets are fetched on every call and never cached: they can be
/// replaced administratively at any time.
#[derive(Debug, Clone)]
pub struct ComplianceEvaluator {
    gateway: Arc<dyn LedgerGateway>,
    clock: Arc<dyn Clock>,
}

impl ComplianceEvaluator {
    /// Create an evaluator reading through `gateway`.
    pub fn new(gateway: Arc<dyn LedgerGateway>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    /// Evaluate `record` for the jurisdiction code `jurisdiction`.
    ///
    /// An unknown or malformed code yields `passed = false` with a single
    /// `UnsupportedJurisdiction` reason. The only error is a failed rule
    /// read.
    pub async fn evaluate(
        &self,
        record: &VerificationRecord,
        jurisdiction: &str,
    ) -> Result<ComplianceResult, LedgerError> {
        let Ok(code) = JurisdictionCode::new(jurisdiction) else {
            tracing::debug!(jurisdiction, "malformed jurisdiction code");
            return Ok(ComplianceResult::unsupported(jurisdiction));
        };
        let rules = self
            .gateway
            .read(&LedgerQuery::GetJurisdictionRules {
                jurisdiction: code.clone(),
            })
            .await?
            .into_rules()?;
        let result = evaluate_rules(record, &code, rules.as_ref(), self.clock.now());
        tracing::debug!(
            subject = %record.subject,
            jurisdiction = %code,
            passed = result.passed,
            reasons = result.reasons.len(),
            "compliance evaluated"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleViolation;
    use kyc_core::{
        ContentHash, ManualClock, RiskScore, SubjectAddress, Timestamp, UserId, VerificationStatus,
    };
    use kyc_ledger::{InMemoryLedger, JurisdictionRuleSet, LedgerOperation};

    fn record() -> VerificationRecord {
        VerificationRecord {
            subject: SubjectAddress::new("0x0000000000000000000000000000000000000abc").unwrap(),
            user_id: UserId::new("user-1").unwrap(),
            content_hash: ContentHash::new("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG").unwrap(),
            risk_score: RiskScore::new(40).unwrap(),
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            status: VerificationStatus::Approved,
            updated_at: Timestamp::from_unix_secs(1_768_478_400).unwrap(),
        }
    }

    fn pk_rules(max: u32) -> JurisdictionRuleSet {
        JurisdictionRuleSet {
            jurisdiction: JurisdictionCode::new("PK").unwrap(),
            max_risk_score: RiskScore::new(max).unwrap(),
            requires_documents: true,
            requires_active: true,
            max_record_age_days: None,
        }
    }

    fn setup(rules: JurisdictionRuleSet) -> (InMemoryLedger, ComplianceEvaluator) {
        let clock = Arc::new(ManualClock::new(
            Timestamp::from_unix_secs(1_768_478_400).unwrap(),
        ));
        let ledger = InMemoryLedger::new(clock.clone()).with_rules(rules);
        let evaluator = ComplianceEvaluator::new(Arc::new(ledger.clone()), clock);
        (ledger, evaluator)
    }

    #[tokio::test]
    async fn unknown_code_never_errors() {
        let (_ledger, evaluator) = setup(pk_rules(50));
        for code in ["UNKNOWN_CODE", "??", ""] {
            let result = evaluator.evaluate(&record(), code).await.unwrap();
            assert!(!result.passed);
            assert_eq!(result.reasons.len(), 1);
            assert_eq!(result.reasons[0].code(), "unsupported_jurisdiction");
        }
    }

    #[tokio::test]
    async fn rules_are_read_fresh_each_call() {
        let (ledger, evaluator) = setup(pk_rules(50));
        assert!(evaluator.evaluate(&record(), "PK").await.unwrap().passed);

        ledger
            .write(&LedgerOperation::SetJurisdictionRules(pk_rules(30)))
            .await
            .unwrap();
        let result = evaluator.evaluate(&record(), "pk").await.unwrap();
        assert!(!result.passed);
        assert!(matches!(
            result.reasons[0],
            RuleViolation::RiskScoreTooHigh { .. }
        ));
    }

    #[tokio::test]
    async fn rule_read_failure_is_an_error() {
        let (ledger, evaluator) = setup(pk_rules(50));
        ledger.fail_reads(1);
        assert!(evaluator.evaluate(&record(), "PK").await.is_err());
    }

    #[tokio::test]
    async fn result_serializes_with_rule_codes() {
        let (_ledger, evaluator) = setup(pk_rules(50));
        let result = evaluator.evaluate(&record(), "XX").await.unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["reasons"][0]["rule"], "unsupported_jurisdiction");
    }
}
