//! # Guarded Gateway
//!
//! Wraps any [`LedgerGateway`] with a bounded per-call timeout and
//! [`RetryPolicy`] backoff.
//!
//! - A read that exceeds the bound is reported as `Unreachable`: reads have no
//!   side effects, so it is retried like any transport failure.
//! - A write that exceeds the bound is reported as `Timeout` and is never
//!   retried here. The caller resolves it with a confirming read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::gateway::LedgerGateway;
use crate::operation::{LedgerOperation, LedgerQuery, LedgerValue};
use crate::receipt::Receipt;
use crate::retry::RetryPolicy;

/// Timeout and retry wrapper around an inner gateway.
#[derive(Debug, Clone)]
pub struct GuardedGateway {
    inner: Arc<dyn LedgerGateway>,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl GuardedGateway {
    /// Wrap `inner`.
    pub fn new(inner: Arc<dyn LedgerGateway>, call_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            inner,
            call_timeout,
            retry,
        }
    }

    /// The per-call bound.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

#[async_trait]
impl LedgerGateway for GuardedGateway {
    async fn read(&self, query: &LedgerQuery) -> Result<LedgerValue, LedgerError> {
        let contract = query.contract();
        let (inner, bound) = (&self.inner, self.call_timeout);
        self.retry
            .run(query.function_name(), || async move {
                match tokio::time::timeout(bound, inner.read(query)).await {
                    Ok(result) => result,
                    Err(_) => Err(LedgerError::Unreachable {
                        contract,
                        reason: format!("read timed out after {bound:?}"),
                    }),
                }
            })
            .await
    }

    async fn write(&self, operation: &LedgerOperation) -> Result<Receipt, LedgerError> {
        let contract = operation.contract();
        let function = operation.function_name();
        let (inner, bound) = (&self.inner, self.call_timeout);
        let result = self
            .retry
            .run(function, || async move {
                match tokio::time::timeout(bound, inner.write(operation)).await {
                    Ok(result) => result,
                    Err(_) => Err(LedgerError::Timeout {
                        contract,
                        tx_hash: None,
                    }),
                }
            })
            .await;

        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(e) => e.kind(),
        };
        metrics::counter!(
            "kyc_ledger_writes_total",
            "contract" => contract.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        match &result {
            Ok(receipt) => tracing::debug!(
                %contract,
                function,
                tx_hash = %receipt.tx_hash,
                block = receipt.block_number,
                "ledger write confirmed"
            ),
            Err(e) if e.is_ambiguous() => {
                tracing::warn!(%contract, function, "ledger write outcome ambiguous: {e}")
            }
            Err(e) => tracing::warn!(%contract, function, "ledger write failed: {e}"),
        }
        result
    }
}
