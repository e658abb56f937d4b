//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use kyc_ledger::{ConfigError, RetryPolicy};
use kyc_multisig::CoordinatorConfig;

/// Settings for [`crate::ReconciliationService`] and its sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Lifetime of a multisig proposal without quorum, in seconds.
    #[serde(default = "default_proposal_ttl")]
    pub proposal_ttl_secs: u64,
    /// Interval between reconciliation sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Unsettled reconciliation reads before a subject is flagged diverged.
    #[serde(default = "default_max_attempts")]
    pub max_reconcile_attempts: u32,
    /// Audit query page size.
    #[serde(default = "default_page_size")]
    pub audit_page_size: usize,
    /// Bound on a single ledger call, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Retry policy for unreachable ledger reads.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_proposal_ttl() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    5
}

fn default_page_size() -> usize {
    50
}

fn default_call_timeout() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            proposal_ttl_secs: default_proposal_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            max_reconcile_attempts: default_max_attempts(),
            audit_page_size: default_page_size(),
            call_timeout_secs: default_call_timeout(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Apply environment overrides on top of `self`.
    ///
    /// Variables: `KYC_PROPOSAL_TTL_SECS`, `KYC_SWEEP_INTERVAL_SECS`,
    /// `KYC_MAX_RECONCILE_ATTEMPTS`, `KYC_AUDIT_PAGE_SIZE`,
    /// `KYC_CALL_TIMEOUT_SECS`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_number("KYC_PROPOSAL_TTL_SECS")? {
            self.proposal_ttl_secs = v;
        }
        if let Some(v) = env_number("KYC_SWEEP_INTERVAL_SECS")? {
            self.sweep_interval_secs = v;
        }
        if let Some(v) = env_number("KYC_MAX_RECONCILE_ATTEMPTS")? {
            self.max_reconcile_attempts = v;
        }
        if let Some(v) = env_number("KYC_AUDIT_PAGE_SIZE")? {
            self.audit_page_size = v;
        }
        if let Some(v) = env_number("KYC_CALL_TIMEOUT_SECS")? {
            self.call_timeout_secs = v;
        }
        Ok(self)
    }

    /// Proposal lifetime, capped at ten years.
    pub fn proposal_ttl(&self) -> chrono::Duration {
        const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;
        let secs = self.proposal_ttl_secs.min(MAX_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }

    /// Sweep interval, at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Ledger call bound, at least one second.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    /// Settings handed to the multisig coordinator.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            proposal_ttl: self.proposal_ttl(),
        }
    }
}

fn env_number<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(var.to_string(), raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ServiceConfig = serde_json::from_str(r#"{"sweep_interval_secs": 5}"#).unwrap();
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.max_reconcile_attempts, 5);
        assert_eq!(config.proposal_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn zero_sweep_interval_is_clamped() {
        let config = ServiceConfig {
            sweep_interval_secs: 0,
            ..ServiceConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn env_override_rejects_garbage() {
        std::env::set_var("KYC_MAX_RECONCILE_ATTEMPTS", "many");
        let result = ServiceConfig::default().with_env_overrides();
        std::env::remove_var("KYC_MAX_RECONCILE_ATTEMPTS");
        assert!(result.is_err());
    }
}
