//! # Inbound Ports (Driving Ports)
//!
//! The manifest contract consumed by the pool manager layer. Both
//! `FileManifest` and `BlockManifest` implement it on top of a shared
//! `ManifestCore`.

use crate::domain::errors::{ClusterLockError, ManifestError};
use crate::domain::identity::{DomainId, HostId, ImageId, VolumeId};
use crate::domain::metadata::{DomainMetadata, MetadataValue, DMDK_VERSION};
use crate::manifest::core::ManifestCore;
use crate::manifest::domain_lock::{self, DomainLockGuard};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Acquire/release pair of the domain lock, plus scoped helpers.
///
/// Release runs exactly once on every exit path of a scope: normal return,
/// error return and panic.
pub trait DomainLock {
    /// Take the cluster lock for `host_id`. Failures surface unchanged.
    fn acquire_domain_lock(&self, host_id: HostId) -> Result<(), ClusterLockError>;

    /// Give the cluster lock back. Failures surface unchanged.
    fn release_domain_lock(&self) -> Result<(), ClusterLockError>;

    /// Acquire the domain lock and return a guard releasing it on drop.
    ///
    /// Nothing is held when this returns an error.
    fn domain_lock(&self, host_id: HostId) -> Result<DomainLockGuard<'_, Self>, ClusterLockError>
    where
        Self: Sized,
    {
        DomainLockGuard::acquire(self, host_id)
    }

    /// Run `body` while holding the domain lock.
    ///
    /// An acquire failure returns before `body` runs and skips release. An
    /// error from `body` is returned unchanged even if release also fails.
    fn with_domain_lock<T, E, F>(&self, host_id: HostId, body: F) -> Result<T, E>
    where
        Self: Sized,
        F: FnOnce() -> Result<T, E>,
        E: From<ClusterLockError>,
    {
        domain_lock::with_domain_lock(self, host_id, body)
    }
}

/// Shared contract of file and block domain manifests.
pub trait StorageDomainManifest: DomainLock + Send + Sync {
    /// Identity, metadata cache and cluster lock shared by every variant.
    fn core(&self) -> &ManifestCore;

    fn sd_uuid(&self) -> DomainId {
        self.core().sd_uuid()
    }

    /// Snapshot of the cached metadata.
    fn get_metadata(&self) -> DomainMetadata {
        self.core().metadata()
    }

    /// One metadata value, `MetadataKeyNotFound` when absent.
    fn get_metadata_param(&self, key: &str) -> Result<MetadataValue, ManifestError> {
        self.core().get_metadata_param(key)
    }

    /// Domain format version.
    fn get_version(&self) -> Result<i64, ManifestError> {
        self.get_metadata_param(DMDK_VERSION)?
            .as_int()
            .ok_or_else(|| ManifestError::InvalidMetadata("VERSION is not an integer".into()))
    }

    /// Replace the stored metadata and the cache.
    ///
    /// Values fixed at construction (block sizes) keep their original value.
    fn replace_metadata(&self, metadata: DomainMetadata) -> Result<(), ManifestError>;

    /// Initialize the cluster lock. Failures surface unchanged.
    fn init_domain_lock(&self) -> Result<(), ClusterLockError> {
        self.core().init_domain_lock()
    }

    /// What a monitor polls to check the domain is alive.
    fn get_monitoring_path(&self) -> PathBuf;

    /// Images currently present, read from storage on every call.
    fn get_all_images(&self) -> Result<BTreeSet<ImageId>, ManifestError>;

    /// Declared virtual size of a volume in bytes.
    fn get_vsize(&self, image: &ImageId, volume: &VolumeId) -> Result<u64, ManifestError>;

    /// Bytes allocated for a volume on storage.
    fn get_valloc_size(&self, image: &ImageId, volume: &VolumeId) -> Result<u64, ManifestError>;

    /// Mark an image deleted. Volumes that are already gone are skipped.
    fn delete_image(
        &self,
        sd_uuid: &DomainId,
        image: &ImageId,
        volumes: Option<&[VolumeId]>,
    ) -> Result<(), ManifestError>;

    /// Remove what is left of a deleted image.
    ///
    /// Succeeds when a concurrent collector already removed it.
    fn purge_image(
        &self,
        sd_uuid: &DomainId,
        image: &ImageId,
        volumes: &[VolumeId],
        force: bool,
    ) -> Result<(), ManifestError>;
}
