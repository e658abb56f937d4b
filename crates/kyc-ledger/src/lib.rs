//! # kyc-ledger — Ledger Gateway
//!
//! Typed read/write facade over the four deployed KYC contracts.
//!
//! - [`LedgerOperation`] / [`LedgerQuery`]: closed variants, one per contract
//!   function, with statically checked field sets.
//! - [`LedgerGateway`]: the transport trait. A write returns a [`Receipt`]
//!   only once confirmed.
//! - [`LedgerError`]: `Unreachable` (retryable), `Reverted` (terminal),
//!   `Timeout` (ambiguous; re-read before retrying).
//! - [`WriteOutcome`]: the three-valued view of a write.
//! - [`GuardedGateway`]: bounded per-call timeout and backoff for any gateway.
//! - [`EvmLedgerGateway`]: JSON-RPC transport for EVM chains.
//! - [`InMemoryLedger`]: contract-rule-faithful ledger with fault injection.
//!
//! The gateway performs no business validation.

pub mod abi;
pub mod config;
pub mod contract;
pub mod error;
pub mod evm;
pub mod gateway;
pub mod guarded;
pub mod memory;
pub mod operation;
pub mod receipt;
pub mod retry;

pub use config::{ConfigError, ContractAddresses, EvmLedgerConfig};
pub use contract::ContractId;
pub use error::LedgerError;
pub use evm::EvmLedgerGateway;
pub use gateway::LedgerGateway;
pub use guarded::GuardedGateway;
pub use memory::{Fault, InMemoryLedger};
pub use operation::{
    AuditEntry, DecisionStatus, JurisdictionRuleSet, LedgerOperation, LedgerQuery, LedgerValue,
};
pub use receipt::{Receipt, WriteOutcome};
pub use retry::RetryPolicy;
