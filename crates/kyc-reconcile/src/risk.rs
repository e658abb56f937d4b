//! Risk scorer batch ingestion types.
//!
//! The scorer is external. Its report is consumed as-is; only subjects it
//! scored successfully produce ledger writes.

use serde::{Deserialize, Serialize};

/// Per-subject result from the scorer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreResult {
    /// Scored.
    Scored {
        /// Subject wallet address, unvalidated.
        subject: String,
        /// Score, unvalidated.
        risk_score: u32,
    },
    /// The scorer could not score the subject.
    Failed {
        /// Subject wallet address, unvalidated.
        subject: String,
        /// Scorer's error.
        error: String,
    },
}

/// A scorer batch report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBatchReport {
    /// Subjects the scorer processed.
    pub processed: usize,
    /// Subjects scored.
    pub successful: usize,
    /// Subjects the scorer failed on.
    pub failed: usize,
    /// Per-subject results.
    pub results: Vec<ScoreResult>,
}

/// What happened to one subject of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskUpdateStatus {
    /// Written and confirmed.
    Applied,
    /// Submitted but unconfirmed; the mirror is stale.
    Pending,
    /// The score was already on the ledger.
    Unchanged,
    /// Not written.
    Rejected {
        /// Why.
        reason: String,
    },
    /// The scorer failed; nothing to write.
    ScorerFailed {
        /// Scorer's error.
        reason: String,
    },
}

/// One subject's row in a [`RiskBatchSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskUpdate {
    /// Subject as reported.
    pub subject: String,
    /// Outcome.
    #[serde(flatten)]
    pub status: RiskUpdateStatus,
}

/// Result of applying a scorer batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskBatchSummary {
    /// Scorer-reported totals, passed through.
    pub processed: usize,
    /// Scores confirmed on the ledger.
    pub applied: usize,
    /// Scores submitted but unconfirmed.
    pub pending: usize,
    /// Scores not written.
    pub rejected: usize,
    /// Per-subject outcomes in report order.
    pub updates: Vec<RiskUpdate>,
}

impl RiskBatchSummary {
    pub(crate) fn push(&mut self, subject: String, status: RiskUpdateStatus) {
        match status {
            RiskUpdateStatus::Applied | RiskUpdateStatus::Unchanged => self.applied += 1,
            RiskUpdateStatus::Pending => self.pending += 1,
            RiskUpdateStatus::Rejected { .. } | RiskUpdateStatus::ScorerFailed { .. } => {
                self.rejected += 1
            }
        }
        self.updates.push(RiskUpdate { subject, status });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scorer_report_parses() {
        let json = r#"{
            "processed": 2, "successful": 1, "failed": 1,
            "results": [
                {"status": "scored", "subject": "0x0000000000000000000000000000000000000abc", "risk_score": 35},
                {"status": "failed", "subject": "0x0000000000000000000000000000000000000def", "error": "no history"}
            ]
        }"#;
        let report: RiskBatchReport = serde_json::from_str(json).unwrap();
        assert_eq!(report.results.len(), 2);
        assert!(matches!(report.results[0], ScoreResult::Scored { risk_score: 35, .. }));
    }
}
