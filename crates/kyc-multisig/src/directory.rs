//! Authorized signer set and threshold.
//!
//! Membership changes administratively, so every consumer reads the
//! directory per operation. Nothing here caches.

use std::sync::Arc;

use async_trait::async_trait;

use kyc_core::SignerId;
use kyc_ledger::{LedgerError, LedgerGateway, LedgerQuery};

/// Current signer set and quorum size, as of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSnapshot {
    /// Authorized signers.
    pub signers: Vec<SignerId>,
    /// Required signatures.
    pub threshold: u8,
}

impl SignerSnapshot {
    /// Whether `signer` is authorized.
    pub fn authorizes(&self, signer: &SignerId) -> bool {
        self.signers.contains(signer)
    }
}

/// Read access to the authorized signer set.
#[async_trait]
pub trait SignerDirectory: Send + Sync + std::fmt::Debug {
    /// Current authorized signers.
    async fn authorized_signers(&self) -> Result<Vec<SignerId>, LedgerError>;

    /// Current threshold.
    async fn threshold(&self) -> Result<u8, LedgerError>;

    /// Both values, read together.
    async fn snapshot(&self) -> Result<SignerSnapshot, LedgerError> {
        let signers = self.authorized_signers().await?;
        let threshold = self.threshold().await?;
        Ok(SignerSnapshot { signers, threshold })
    }
}

/// Directory backed by the multisig manager contract.
#[derive(Debug, Clone)]
pub struct LedgerSignerDirectory {
    gateway: Arc<dyn LedgerGateway>,
}

impl LedgerSignerDirectory {
    /// Read through `gateway`.
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl SignerDirectory for LedgerSignerDirectory {
    async fn authorized_signers(&self) -> Result<Vec<SignerId>, LedgerError> {
        self.gateway.read(&LedgerQuery::GetSigners).await?.into_signers()
    }

    async fn threshold(&self) -> Result<u8, LedgerError> {
        self.gateway.read(&LedgerQuery::GetThreshold).await?.into_threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kyc_core::{ManualClock, Timestamp};
    use kyc_ledger::{InMemoryLedger, LedgerOperation};

    fn signer(n: u8) -> SignerId {
        SignerId::new(&format!("0x{:040x}", n)).unwrap()
    }

    #[tokio::test]
    async fn membership_changes_are_visible_immediately() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0).unwrap()));
        let ledger = InMemoryLedger::new(clock).with_signers(vec![signer(1), signer(2)], 1);
        let directory = LedgerSignerDirectory::new(Arc::new(ledger.clone()));

        let before = directory.snapshot().await.unwrap();
        assert!(before.authorizes(&signer(1)));
        assert!(!before.authorizes(&signer(3)));

        ledger
            .write(&LedgerOperation::AddSigner { signer: signer(3) })
            .await
            .unwrap();
        let after = directory.snapshot().await.unwrap();
        assert!(after.authorizes(&signer(3)));
        assert_eq!(after.threshold, 1);
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(0).unwrap()));
        let ledger = InMemoryLedger::new(clock).with_signers(vec![signer(1)], 1);
        ledger.fail_reads(1);
        let directory = LedgerSignerDirectory::new(Arc::new(ledger));
        assert!(directory.snapshot().await.is_err());
    }
}
