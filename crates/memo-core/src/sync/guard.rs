//! Per-identity single-flight lock for reconciliation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// At most one holder per key; later callers wait for the current holder.
#[derive(Debug, Default)]
pub struct SingleFlight {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SingleFlight {
    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Wait until no other caller holds `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Take `key` only if it is free right now.
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive_other_keys_are_not() {
        let flight = SingleFlight::default();
        let held = flight.acquire("alice").await;

        assert!(flight.try_acquire("alice").is_none());
        assert!(flight.try_acquire("bob").is_some());

        drop(held);
        assert!(flight.try_acquire("alice").is_some());
    }
}
