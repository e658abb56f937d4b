//! Per-subject mutual exclusion.
//!
//! Operations on one subject run one at a time; operations on different
//! subjects never wait on each other. The table lock is synchronous and
//! only held to look up or insert a subject's mutex.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use kyc_core::SubjectAddress;

/// Lazily created async mutex per subject.
#[derive(Debug, Default)]
pub struct SubjectLocks {
    locks: Mutex<HashMap<SubjectAddress, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubjectLocks {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `subject`.
    pub async fn lock(&self, subject: &SubjectAddress) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(subject.clone()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop mutexes nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    /// Tracked subjects.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether no subject is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
