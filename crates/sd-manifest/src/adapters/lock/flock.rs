//! # Lease File Lock
//!
//! Cluster lock over the domain's `dom_md/leases` file using `fs2`
//! (flock on Unix, LockFile on Windows). The holder writes its host id into
//! the lease file so other hosts can report who is in the way.
//!
//! flock is tied to the open file description, so two instances on the same
//! lease exclude each other even inside one process.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::domain::config::FlockLockConfig;
use crate::domain::errors::ClusterLockError;
use crate::domain::identity::HostId;
use crate::domain::layout::{DOMAIN_META_DATA, LEASES};
use crate::ports::outbound::ClusterLock;

struct HeldLease {
    /// Kept open to maintain the lock
    file: File,
    host_id: HostId,
}

/// Exclusive lock on a domain lease file.
pub struct FlockClusterLock {
    lease_path: PathBuf,
    config: FlockLockConfig,
    held: Mutex<Option<HeldLease>>,
}

impl FlockClusterLock {
    pub fn new(lease_path: impl Into<PathBuf>, config: FlockLockConfig) -> Self {
        Self {
            lease_path: lease_path.into(),
            config,
            held: Mutex::new(None),
        }
    }

    /// Lock on the lease file of the file domain rooted at `domain_dir`.
    pub fn for_domain(domain_dir: &Path, config: FlockLockConfig) -> Self {
        Self::new(domain_dir.join(DOMAIN_META_DATA).join(LEASES), config)
    }

    pub fn lease_path(&self) -> &Path {
        &self.lease_path
    }

    /// Host id recorded in the lease file, if any.
    pub fn recorded_holder(&self) -> Option<HostId> {
        fs::read_to_string(&self.lease_path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }

    fn resource(&self) -> String {
        self.lease_path.display().to_string()
    }

    fn open_lease(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.lease_path)
    }
}

impl ClusterLock for FlockClusterLock {
    fn initialize(&self) -> Result<(), ClusterLockError> {
        if let Some(parent) = self.lease_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lease_path)?;
        file.sync_all()?;
        debug!("[sd-manifest] Lease file ready at {}", self.lease_path.display());
        Ok(())
    }

    /// Retries with exponential backoff until `acquire_timeout` expires.
    fn acquire(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        if let Some(lease) = self.held.lock().as_ref() {
            return Err(ClusterLockError::AlreadyHeld {
                holder: Some(lease.host_id),
                resource: self.resource(),
            });
        }

        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout;
        let mut retry_delay = self.config.initial_retry_delay;

        loop {
            let mut file = self.open_lease()?;

            if FileExt::try_lock_exclusive(&file).is_ok() {
                file.set_len(0)?;
                writeln!(file, "{}", host_id)?;
                file.sync_all()?;

                *self.held.lock() = Some(HeldLease { file, host_id });
                info!(
                    "[sd-manifest] Lease {} taken by host {}",
                    self.lease_path.display(),
                    host_id
                );
                return Ok(());
            }
            drop(file);

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "[sd-manifest] Lease {} busy, holder {:?}",
                    self.lease_path.display(),
                    self.recorded_holder()
                );
                return Err(ClusterLockError::Timeout {
                    resource: self.resource(),
                    waited: now - started,
                });
            }

            std::thread::sleep(retry_delay.min(deadline - now));
            retry_delay = (retry_delay * 2).min(self.config.max_retry_delay);
        }
    }

    fn release(&self) -> Result<(), ClusterLockError> {
        let lease = self
            .held
            .lock()
            .take()
            .ok_or_else(|| ClusterLockError::NotHeld(self.resource()))?;

        // Clear the holder record before giving up the lock.
        lease.file.set_len(0)?;
        FileExt::unlock(&lease.file)?;
        info!(
            "[sd-manifest] Lease {} released by host {}",
            self.lease_path.display(),
            lease.host_id
        );
        Ok(())
    }

    fn inquire(&self) -> Option<HostId> {
        self.held.lock().as_ref().map(|lease| lease.host_id)
    }
}

impl Drop for FlockClusterLock {
    fn drop(&mut self) {
        if let Some(lease) = self.held.get_mut().take() {
            let _ = FileExt::unlock(&lease.file);
        }
    }
}
