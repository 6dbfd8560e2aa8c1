//! # Scoped Domain Lock
//!
//! The domain lock is taken before the caller's code runs and released
//! exactly once afterwards, whatever way the caller's code exits. Two forms:
//!
//! - `DomainLockGuard`: RAII guard; `release()` returns the release result,
//!   dropping it releases and logs a failure it cannot return
//! - `with_domain_lock`: runs a closure between acquire and release

use crate::domain::errors::ClusterLockError;
use crate::domain::identity::HostId;
use crate::ports::inbound::DomainLock;
use tracing::warn;

/// Held domain lock. Released when dropped.
#[must_use = "the domain lock is released as soon as the guard is dropped"]
pub struct DomainLockGuard<'a, L: DomainLock + ?Sized> {
    owner: &'a L,
    host_id: HostId,
    released: bool,
}

impl<'a, L: DomainLock + ?Sized> DomainLockGuard<'a, L> {
    /// Acquire the lock of `owner` for `host_id`.
    pub fn acquire(owner: &'a L, host_id: HostId) -> Result<Self, ClusterLockError> {
        owner.acquire_domain_lock(host_id)?;
        Ok(Self {
            owner,
            host_id,
            released: false,
        })
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    /// Release now and report the outcome.
    pub fn release(mut self) -> Result<(), ClusterLockError> {
        self.released = true;
        self.owner.release_domain_lock()
    }
}

impl<L: DomainLock + ?Sized> Drop for DomainLockGuard<'_, L> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.owner.release_domain_lock() {
            warn!(
                "[sd-manifest] Domain lock release for host {} failed: {}",
                self.host_id, e
            );
        }
    }
}

/// Run `body` between acquiring and releasing the domain lock of `owner`.
pub fn with_domain_lock<L, T, E, F>(owner: &L, host_id: HostId, body: F) -> Result<T, E>
where
    L: DomainLock + ?Sized,
    F: FnOnce() -> Result<T, E>,
    E: From<ClusterLockError>,
{
    let guard = DomainLockGuard::acquire(owner, host_id)?;
    let outcome = body();
    let released = guard.release();

    match (outcome, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err.into()),
        (Err(body_err), Ok(())) => Err(body_err),
        (Err(body_err), Err(release_err)) => {
            warn!(
                "[sd-manifest] Domain lock release for host {} failed after body error: {}",
                host_id, release_err
            );
            Err(body_err)
        }
    }
}
