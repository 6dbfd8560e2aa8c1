//! # In-Memory Cluster Lock
//!
//! Cluster lock that only spans this process. Enough for a single host, and
//! for wiring a manifest without shared storage.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::domain::errors::ClusterLockError;
use crate::domain::identity::HostId;
use crate::ports::outbound::ClusterLock;

/// Process-local `ClusterLock`.
#[derive(Default)]
pub struct InMemoryClusterLock {
    name: String,
    initialized: AtomicBool,
    holder: Mutex<Option<HostId>>,
}

impl InMemoryClusterLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

impl ClusterLock for InMemoryClusterLock {
    fn initialize(&self) -> Result<(), ClusterLockError> {
        self.initialized.store(true, Ordering::Release);
        debug!("[sd-manifest] In-memory lock {} initialized", self.name);
        Ok(())
    }

    fn acquire(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        if !self.is_initialized() {
            return Err(ClusterLockError::Backend(format!(
                "lock {} is not initialized",
                self.name
            )));
        }
        let mut holder = self.holder.lock();
        if let Some(current) = *holder {
            return Err(ClusterLockError::AlreadyHeld {
                holder: Some(current),
                resource: self.name.clone(),
            });
        }
        *holder = Some(host_id);
        Ok(())
    }

    fn release(&self) -> Result<(), ClusterLockError> {
        self.holder
            .lock()
            .take()
            .map(|_| ())
            .ok_or_else(|| ClusterLockError::NotHeld(self.name.clone()))
    }

    fn inquire(&self) -> Option<HostId> {
        *self.holder.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_requires_initialize() {
        let lock = InMemoryClusterLock::new("sd");
        assert!(matches!(lock.acquire(1), Err(ClusterLockError::Backend(_))));
        lock.initialize().unwrap();
        lock.acquire(1).unwrap();
        assert_eq!(lock.inquire(), Some(1));
    }

    #[test]
    fn test_second_host_is_refused() {
        let lock = InMemoryClusterLock::new("sd");
        lock.initialize().unwrap();
        lock.acquire(1).unwrap();
        assert!(matches!(
            lock.acquire(2),
            Err(ClusterLockError::AlreadyHeld { holder: Some(1), .. })
        ));
        lock.release().unwrap();
        lock.acquire(2).unwrap();
    }

    #[test]
    fn test_release_without_acquire() {
        let lock = InMemoryClusterLock::new("sd");
        assert!(matches!(lock.release(), Err(ClusterLockError::NotHeld(_))));
    }
}
