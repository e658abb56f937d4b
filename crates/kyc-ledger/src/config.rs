//! EVM ledger configuration.
//!
//! Loaded from environment variables or built explicitly. The RPC URL is
//! treated as a credential (providers embed API keys in the path), so the
//! `Debug` implementation prints only its host.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use kyc_core::normalize_address;

use crate::contract::ContractId;

/// Addresses of the four deployed contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    /// Data storage contract.
    pub data_storage: String,
    /// Audit log contract.
    pub audit_log: String,
    /// Compliance checker contract.
    pub compliance_checker: String,
    /// Multisig manager contract.
    pub multisig_manager: String,
}

impl ContractAddresses {
    /// Address of `contract`.
    pub fn get(&self, contract: ContractId) -> &str {
        match contract {
            ContractId::DataStorage => &self.data_storage,
            ContractId::AuditLog => &self.audit_log,
            ContractId::ComplianceChecker => &self.compliance_checker,
            ContractId::MultisigManager => &self.multisig_manager,
        }
    }

    fn normalized(self) -> Result<Self, ConfigError> {
        let norm = |var: &'static str, v: String| {
            normalize_address(&v).map_err(|_| ConfigError::InvalidAddress(var.to_string(), v))
        };
        Ok(Self {
            data_storage: norm("data_storage", self.data_storage)?,
            audit_log: norm("audit_log", self.audit_log)?,
            compliance_checker: norm("compliance_checker", self.compliance_checker)?,
            multisig_manager: norm("multisig_manager", self.multisig_manager)?,
        })
    }
}

/// Connection settings for [`crate::EvmLedgerGateway`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Deployed contract addresses.
    pub contracts: ContractAddresses,
    /// Sender whose transactions the RPC provider signs.
    pub from_address: String,
    /// EVM chain id.
    pub chain_id: u64,
    /// Blocks on top of the inclusion block before a write counts as confirmed.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Bounded window for observing confirmation, in seconds.
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    /// Receipt polling interval in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_confirmations() -> u64 {
    1
}
fn default_call_timeout() -> u64 {
    30
}
fn default_confirmation_timeout() -> u64 {
    120
}
fn default_poll_interval() -> u64 {
    2_000
}

impl std::fmt::Debug for EvmLedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmLedgerConfig")
            .field("rpc_host", &self.rpc_url.host_str().unwrap_or("[none]"))
            .field("rpc_url", &"[REDACTED]")
            .field("contracts", &self.contracts)
            .field("from_address", &self.from_address)
            .field("chain_id", &self.chain_id)
            .field("confirmations", &self.confirmations)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .field("confirmation_timeout_secs", &self.confirmation_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl EvmLedgerConfig {
    /// Build with defaults: 1 confirmation, 30s calls, 120s confirmation
    /// window, 2s polling. Addresses are validated and lowercased.
    pub fn new(
        rpc_url: Url,
        contracts: ContractAddresses,
        from_address: &str,
        chain_id: u64,
    ) -> Result<Self, ConfigError> {
        let from_address = normalize_address(from_address)
            .map_err(|_| ConfigError::InvalidAddress("from_address".into(), from_address.into()))?;
        Ok(Self {
            rpc_url,
            contracts: contracts.normalized()?,
            from_address,
            chain_id,
            confirmations: default_confirmations(),
            call_timeout_secs: default_call_timeout(),
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
        })
    }

    /// Validate and lowercase the addresses of a deserialized config.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let mut cfg = Self::new(self.rpc_url, self.contracts, &self.from_address, self.chain_id)?;
        cfg.confirmations = self.confirmations;
        cfg.call_timeout_secs = self.call_timeout_secs;
        cfg.confirmation_timeout_secs = self.confirmation_timeout_secs;
        cfg.poll_interval_ms = self.poll_interval_ms;
        Ok(cfg)
    }

    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `KYC_RPC_URL` (required)
    /// - `KYC_DATA_STORAGE_ADDRESS`, `KYC_AUDIT_LOG_ADDRESS`,
    ///   `KYC_COMPLIANCE_ADDRESS`, `KYC_MULTISIG_ADDRESS` (required)
    /// - `KYC_FROM_ADDRESS` (required)
    /// - `KYC_CHAIN_ID` (default: 1)
    /// - `KYC_CALL_TIMEOUT_SECS` (default: 30)
    /// - `KYC_CONFIRMATIONS` (default: 1)
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_raw = required("KYC_RPC_URL")?;
        let rpc_url =
            Url::parse(&rpc_raw).map_err(|e| ConfigError::InvalidUrl("KYC_RPC_URL".into(), e.to_string()))?;
        let contracts = ContractAddresses {
            data_storage: required("KYC_DATA_STORAGE_ADDRESS")?,
            audit_log: required("KYC_AUDIT_LOG_ADDRESS")?,
            compliance_checker: required("KYC_COMPLIANCE_ADDRESS")?,
            multisig_manager: required("KYC_MULTISIG_ADDRESS")?,
        };
        let from = required("KYC_FROM_ADDRESS")?;
        let mut cfg = Self::new(rpc_url, contracts, &from, env_u64("KYC_CHAIN_ID", 1)?)?;
        cfg.call_timeout_secs = env_u64("KYC_CALL_TIMEOUT_SECS", default_call_timeout())?;
        cfg.confirmations = env_u64("KYC_CONFIRMATIONS", default_confirmations())?;
        Ok(cfg)
    }

    /// Per-request HTTP timeout.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Confirmation window.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Receipt polling interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn env_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(var.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("invalid address for {0}: {1}")]
    InvalidAddress(String, String),
    #[error("invalid number for {0}: {1}")]
    InvalidNumber(String, String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
