//! The independently deployed contracts the gateway talks to.

use serde::{Deserialize, Serialize};

/// One deployed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractId {
    /// Verification records.
    DataStorage,
    /// Append-only audit entries.
    AuditLog,
    /// Jurisdiction rule registry.
    ComplianceChecker,
    /// Signer set and threshold.
    MultisigManager,
}

impl ContractId {
    /// All contracts.
    pub const ALL: [ContractId; 4] = [
        Self::DataStorage,
        Self::AuditLog,
        Self::ComplianceChecker,
        Self::MultisigManager,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataStorage => "data_storage",
            Self::AuditLog => "audit_log",
            Self::ComplianceChecker => "compliance_checker",
            Self::MultisigManager => "multisig_manager",
        }
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
