//! Per-key async mutual exclusion.
//!
//! Uniqueness checks (subnet, IP, port name) are reads followed by a write.
//! Holding the key's lock across both closes the window in which two calls
//! pass the same check. Unrelated keys never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

/// Lock key for everything touching one network's switch.
pub fn network_key(network_id: &str) -> String {
    format!("network:{}", network_id)
}

/// Lock key for claiming a logical switch name.
pub fn switch_key(switch_name: &str) -> String {
    format!("switch:{}", switch_name)
}

/// Lock key for claiming a subnet.
pub fn subnet_key(subnet: &str) -> String {
    format!("subnet:{}", subnet)
}

/// Registry of named async mutexes.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held lock; releases on drop.
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock for `key`.
    pub async fn lock(&self, key: impl Into<String>) -> KeyGuard {
        let key = key.into();
        let mutex = {
            let mut locks = self.locks.lock();
            // Drop entries nobody holds or waits on.
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        KeyGuard {
            key,
            _guard: mutex.lock_owned().await,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .values()
            .filter(|m| Arc::strong_count(m) > 1)
            .count()
    }
}
