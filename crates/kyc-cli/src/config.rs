//! # CLI Configuration
//!
//! `kycctl` reads an optional YAML file:
//!
//! ```yaml
//! ledger:
//!   rpc_url: https://rpc.example.net
//!   contracts:
//!     data_storage: "0x..."
//!     audit_log: "0x..."
//!     compliance_checker: "0x..."
//!     multisig_manager: "0x..."
//!   from_address: "0x..."
//!   chain_id: 1
//! service:
//!   proposal_ttl_secs: 86400
//!   sweep_interval_secs: 60
//! ```
//!
//! Without a `ledger` section the `KYC_*` ledger variables are used when
//! `KYC_RPC_URL` is set. Service settings accept `KYC_*` overrides on top of
//! the file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use kyc_ledger::{EvmLedgerConfig, EvmLedgerGateway, GuardedGateway, LedgerGateway};
use kyc_reconcile::ServiceConfig;

/// Everything `kycctl` can be configured with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KycConfig {
    /// Deployed contracts. Absent when only `simulate` is used.
    #[serde(default)]
    pub ledger: Option<EvmLedgerConfig>,
    /// Reconciliation service settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl KycConfig {
    /// Load from `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        config.ledger = match config.ledger.take() {
            Some(ledger) => Some(ledger.validated().context("invalid ledger section")?),
            None if std::env::var_os("KYC_RPC_URL").is_some() => {
                Some(EvmLedgerConfig::from_env().context("invalid ledger environment")?)
            }
            None => None,
        };
        config.service = config
            .service
            .with_env_overrides()
            .context("invalid service environment")?;
        Ok(config)
    }

    fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_yaml(&raw).with_context(|| format!("invalid config file: {}", path.display()))
    }

    /// Parse YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// The ledger section, or an error naming how to provide it.
    pub fn ledger(&self) -> Result<&EvmLedgerConfig> {
        self.ledger
            .as_ref()
            .context("no ledger configured: pass --config with a `ledger` section or set KYC_RPC_URL")
    }

    /// A guarded gateway to the configured contracts.
    pub fn gateway(&self) -> Result<Arc<dyn LedgerGateway>> {
        let evm = EvmLedgerGateway::new(self.ledger()?.clone()).context("failed to build ledger client")?;
        Ok(Arc::new(GuardedGateway::new(
            Arc::new(evm),
            self.service.call_timeout(),
            self.service.retry,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
ledger:
  rpc_url: https://rpc.example.net/key/secret
  contracts:
    data_storage: "0x0000000000000000000000000000000000000001"
    audit_log: "0x0000000000000000000000000000000000000002"
    compliance_checker: "0x0000000000000000000000000000000000000003"
    multisig_manager: "0x0000000000000000000000000000000000000004"
  from_address: "0x00000000000000000000000000000000000000aa"
  chain_id: 137
service:
  sweep_interval_secs: 15
"#;

    #[test]
    fn yaml_fills_defaults() {
        let config = KycConfig::from_yaml(YAML).unwrap();
        let ledger = config.ledger().unwrap();
        assert_eq!(ledger.chain_id, 137);
        assert_eq!(ledger.confirmations, 1);
        assert_eq!(config.service.sweep_interval_secs, 15);
        assert_eq!(config.service.max_reconcile_attempts, 5);
    }

    #[test]
    fn debug_output_hides_rpc_url() {
        let config = KycConfig::from_yaml(YAML).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn empty_config_has_no_ledger() {
        let config = KycConfig::from_yaml("{}").unwrap();
        assert!(config.ledger().is_err());
        assert_eq!(config.service, ServiceConfig::default());
    }
}
