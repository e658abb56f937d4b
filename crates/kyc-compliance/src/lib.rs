//! # kyc-compliance — Compliance Evaluator
//!
//! Evaluates a [`kyc_core::VerificationRecord`] against the rule set of a
//! jurisdiction. The rule check itself ([`evaluate_rules`]) is pure; the
//! [`ComplianceEvaluator`] reads rule sets from the ledger at call time.
//!
//! An unknown jurisdiction is a structured negative result, never an error.

pub mod evaluator;
pub mod rules;

pub use evaluator::ComplianceEvaluator;
pub use kyc_ledger::JurisdictionRuleSet;
pub use rules::{evaluate_rules, ComplianceResult, RuleViolation};
