//! The `LedgerGateway` trait.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::operation::{LedgerOperation, LedgerQuery, LedgerValue};
use crate::receipt::{Receipt, WriteOutcome};

/// Typed read/write facade over the deployed contracts.
///
/// Implementations do transport and encoding only. A write returns once the
/// transaction is confirmed; a confirmation that is not observed within the
/// implementation's bounded window is reported as [`LedgerError::Timeout`].
#[async_trait]
pub trait LedgerGateway: Send + Sync + std::fmt::Debug {
    /// Execute a read-only query.
    async fn read(&self, query: &LedgerQuery) -> Result<LedgerValue, LedgerError>;

    /// Submit a write and wait for confirmation.
    async fn write(&self, operation: &LedgerOperation) -> Result<Receipt, LedgerError>;

    /// [`Self::write`], classified into a [`WriteOutcome`].
    async fn submit(&self, operation: &LedgerOperation) -> WriteOutcome {
        WriteOutcome::from_result(self.write(operation).await)
    }

    /// Whether `operation` is already visible on the ledger.
    async fn is_applied(&self, operation: &LedgerOperation) -> Result<bool, LedgerError> {
        let value = self.read(&operation.confirmation_query()).await?;
        Ok(operation.is_reflected_in(&value))
    }
}
