//! # Outbound Ports (Driven Ports)
//!
//! Collaborators the manifest calls into but does not implement: the
//! cluster-wide lock and the two storage backends.
//!
//! Production locks and LVM wrappers live with the host agent. This crate
//! ships `FlockClusterLock`, `InMemoryClusterLock`, `LocalFileOperations` and
//! `FakeLvm` in `crate::adapters`.

use crate::domain::errors::{BackendError, ClusterLockError};
use crate::domain::identity::HostId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fencing-capable exclusive lock keyed by domain.
///
/// Calls may block on I/O to shared storage. Timeouts belong to the
/// implementation; the manifest never retries.
pub trait ClusterLock: Send + Sync {
    /// Prepare the lock's on-storage resources.
    fn initialize(&self) -> Result<(), ClusterLockError>;

    /// Take the lock on behalf of `host_id`.
    fn acquire(&self, host_id: HostId) -> Result<(), ClusterLockError>;

    /// Give the lock back.
    fn release(&self) -> Result<(), ClusterLockError>;

    /// Host holding the lock through this instance, if any.
    fn inquire(&self) -> Option<HostId>;
}

/// Path-based file operations of the File backend.
///
/// Removal of a missing path is reported as a not-found `BackendError`;
/// callers decide whether that is a failure.
pub trait FileOperations: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Names of the entries of a directory.
    fn list_dir(&self, path: &Path) -> Result<Vec<String>, BackendError>;

    fn create_dir_all(&self, path: &Path) -> Result<(), BackendError>;

    fn rename(&self, from: &Path, to: &Path) -> Result<(), BackendError>;

    fn remove_file(&self, path: &Path) -> Result<(), BackendError>;

    /// Remove an empty directory.
    fn remove_dir(&self, path: &Path) -> Result<(), BackendError>;

    fn remove_dir_all(&self, path: &Path) -> Result<(), BackendError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, BackendError>;

    /// Replace `path` with `data` (write to a temp file, sync, rename).
    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), BackendError>;

    /// Create a sparse file of `size` bytes.
    fn create_sparse(&self, path: &Path, size: u64) -> Result<(), BackendError>;

    /// Apparent size in bytes.
    fn file_size(&self, path: &Path) -> Result<u64, BackendError>;

    /// Bytes actually allocated on storage.
    fn allocated_size(&self, path: &Path) -> Result<u64, BackendError>;
}

/// Volume group as reported by LVM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub name: String,
    /// Extent size in bytes.
    pub extent_size: u64,
    pub tags: Vec<String>,
}

/// Logical volume as reported by LVM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalVolume {
    pub vg_name: String,
    pub name: String,
    pub extent_count: u64,
    /// Extent size in bytes.
    pub extent_size: u64,
    pub tags: Vec<String>,
    pub active: bool,
}

impl LogicalVolume {
    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.extent_count.saturating_mul(self.extent_size)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Tag values after `prefix`.
    pub fn tag_values<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter_map(move |t| t.strip_prefix(prefix))
    }
}

/// Volume group / logical volume manager of the Block backend.
pub trait LvmBackend: Send + Sync {
    fn get_vg(&self, vg: &str) -> Result<VolumeGroup, BackendError>;

    fn change_vg_tags(&self, vg: &str, del: &[String], add: &[String]) -> Result<(), BackendError>;

    /// Create an LV of at least `size` bytes, rounded up to whole extents.
    fn create_lv(
        &self,
        vg: &str,
        lv: &str,
        size: u64,
        tags: &[String],
    ) -> Result<LogicalVolume, BackendError>;

    fn get_lv(&self, vg: &str, lv: &str) -> Result<LogicalVolume, BackendError>;

    /// All LVs of a VG with their tags.
    fn list_lvs(&self, vg: &str) -> Result<Vec<LogicalVolume>, BackendError>;

    fn change_lv_tags(
        &self,
        vg: &str,
        lv: &str,
        del: &[String],
        add: &[String],
    ) -> Result<(), BackendError>;

    fn remove_lv(&self, vg: &str, lv: &str) -> Result<(), BackendError>;

    /// Device node of an LV. The node only exists while the LV is active.
    fn lv_path(&self, vg: &str, lv: &str) -> PathBuf;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lv_size_and_tags() {
        let lv = LogicalVolume {
            vg_name: "vg".to_string(),
            name: "lv".to_string(),
            extent_count: 2,
            extent_size: 128 * 1024 * 1024,
            tags: vec!["IU_a".to_string(), "MD_5".to_string()],
            active: false,
        };
        assert_eq!(lv.size(), 256 * 1024 * 1024);
        assert!(lv.has_tag("MD_5"));
        assert_eq!(lv.tag_values("IU_").collect::<Vec<_>>(), vec!["a"]);
    }
}
