//! Background sweep.
//!
//! Runs [`ReconciliationService::sweep`] every `sweep_interval` until the
//! shutdown channel flips to `true` or its sender is dropped. A sweep in
//! progress finishes before shutdown is observed.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::service::ReconciliationService;

/// Spawn the sweep loop. The first sweep runs immediately.
pub fn spawn_sweeper(
    service: Arc<ReconciliationService>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = service.config().sweep_interval();
        tracing::info!(interval_secs = period.as_secs(), "reconciliation sweeper started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = service.sweep().await;
                    metrics::counter!("kyc_reconcile_sweeps_total").increment(1);
                    tracing::debug!(
                        expired = report.expired_proposals,
                        resolved = report.resolved_executions,
                        checked = report.reconcile.checked,
                        corrected = report.reconcile.corrected,
                        audit_repaired = report.audit_repair.repaired,
                        "sweep complete"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("reconciliation sweeper shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::mirror::{InMemoryMirror, MirrorState};
    use crate::service::KycSubmission;
    use kyc_core::ManualClock;
    use kyc_ledger::{ContractId, Fault, InMemoryLedger, RetryPolicy};
    use std::time::Duration;

    #[tokio::test]
    async fn sweeper_settles_stale_entries_and_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::default());
        let ledger = InMemoryLedger::new(clock.clone());
        let mirror = Arc::new(InMemoryMirror::new());
        let config = ServiceConfig {
            retry: RetryPolicy::none(),
            ..ServiceConfig::default()
        };
        let service = Arc::new(ReconciliationService::new(
            Arc::new(ledger.clone()),
            mirror.clone(),
            clock,
            config,
        ));

        ledger.inject_for(ContractId::DataStorage, Fault::TimeoutApplied);
        let submission = KycSubmission::new(
            "0x0000000000000000000000000000000000000abc",
            "user-1",
            "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
            10,
            "PK",
        )
        .unwrap();
        service.submit_kyc(submission).await.unwrap();
        assert_eq!(mirror.count(MirrorState::Stale), 1);

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(Arc::clone(&service), rx);

        let mut settled = false;
        for _ in 0..50 {
            if mirror.count(MirrorState::Fresh) == 1 {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(settled);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn dropped_sender_stops_the_sweeper() {
        let clock = Arc::new(ManualClock::default());
        let service = Arc::new(ReconciliationService::new(
            Arc::new(InMemoryLedger::new(clock.clone())),
            Arc::new(InMemoryMirror::new()),
            clock,
            ServiceConfig::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(service, rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
