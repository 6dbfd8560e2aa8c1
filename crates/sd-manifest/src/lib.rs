//! # Storage Domain Manifest
//!
//! In-process view of a shared storage domain: a pool of virtual-disk images
//! that many hosts use concurrently. The manifest owns the domain identity and
//! cached metadata, drives the cluster-wide domain lock, and for block domains
//! allocates per-volume metadata slots.
//!
//! ## Domain Invariants
//!
//! | Invariant | Description |
//! |-----------|-------------|
//! | Single holder | Only one host holds a domain's cluster lock at a time |
//! | Scoped release | Domain lock and slot lock are released on every exit path |
//! | Reserved slots | Metadata slots `0..3` are never handed out |
//! | Unique slots | No two volumes on this host receive the same slot concurrently |
//! | Fixed block sizes | Block sizes are read once, at construction |
//! | Convergent purge | Purging an image that is already gone succeeds |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Identifiers, metadata, layout constants, slot arithmetic
//! - `ports/` - Manifest contract (inbound) and collaborators (outbound)
//! - `manifest/` - Shared core plus the file and block variants
//! - `adapters/` - Cluster lock, local filesystem and fake LVM backends
//!
//! ## Usage
//!
//! ```ignore
//! use sd_manifest::{DomainLock, FileManifest, StorageDomainManifest};
//!
//! let manifest = FileManifest::open(domain_dir, deps, ManifestConfig::default())?;
//! manifest.init_domain_lock()?;
//!
//! manifest.with_domain_lock(host_id, || -> Result<(), ManifestError> {
//!     // pool manager critical section
//!     Ok(())
//! })?;
//! ```

pub mod adapters;
pub mod domain;
pub mod manifest;
pub mod ports;

#[cfg(test)]
mod test_utils;

pub use adapters::{FakeLvm, InMemoryClusterLock, LocalFileOperations};
#[cfg(feature = "locking")]
pub use adapters::FlockClusterLock;
pub use domain::config::{FlockLockConfig, ManifestConfig};
pub use domain::errors::{BackendError, ClusterLockError, ManifestError, ManifestResult};
pub use domain::identity::{DomainId, HostId, ImageId, VolumeId};
pub use domain::metadata::{DomainMetadata, MetadataValue};
pub use domain::slots::OccupiedSlot;
pub use domain::volume_metadata::VolumeMetadata;
pub use manifest::block::{BlockManifest, BlockManifestDependencies, MetadataSlotGuard};
pub use manifest::core::ManifestCore;
pub use manifest::domain_lock::DomainLockGuard;
pub use manifest::file::{FileManifest, FileManifestDependencies};
pub use ports::inbound::{DomainLock, StorageDomainManifest};
pub use ports::outbound::{ClusterLock, FileOperations, LogicalVolume, LvmBackend, VolumeGroup};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
