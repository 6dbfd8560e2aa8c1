//! # Manifest Core
//!
//! State shared by every manifest variant. Variants own a `ManifestCore` and
//! add their storage-specific behaviour around it.

use crate::domain::config::ManifestConfig;
use crate::domain::errors::{ClusterLockError, ManifestError};
use crate::domain::identity::{DomainId, HostId};
use crate::domain::metadata::{DomainMetadata, MetadataValue};
use crate::ports::outbound::ClusterLock;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Domain identity, cached metadata and the domain's cluster lock.
pub struct ManifestCore {
    sd_uuid: DomainId,
    /// Read-mostly; readers never wait on the cluster lock.
    metadata: RwLock<DomainMetadata>,
    cluster_lock: Arc<dyn ClusterLock>,
    config: ManifestConfig,
}

impl ManifestCore {
    pub fn new(
        sd_uuid: DomainId,
        metadata: DomainMetadata,
        cluster_lock: Arc<dyn ClusterLock>,
        config: ManifestConfig,
    ) -> Self {
        Self {
            sd_uuid,
            metadata: RwLock::new(metadata),
            cluster_lock,
            config,
        }
    }

    pub fn sd_uuid(&self) -> DomainId {
        self.sd_uuid
    }

    pub fn config(&self) -> &ManifestConfig {
        &self.config
    }

    pub fn metadata(&self) -> DomainMetadata {
        self.metadata.read().clone()
    }

    pub fn get_metadata_param(&self, key: &str) -> Result<MetadataValue, ManifestError> {
        self.metadata.read().require(key).cloned()
    }

    /// Swap the cached metadata. Persisting it is the variant's job.
    pub fn replace_cached_metadata(&self, metadata: DomainMetadata) {
        *self.metadata.write() = metadata;
    }

    pub fn init_domain_lock(&self) -> Result<(), ClusterLockError> {
        debug!("[sd-manifest] Initializing domain lock for {}", self.sd_uuid);
        self.cluster_lock.initialize()
    }

    pub fn acquire_domain_lock(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        self.cluster_lock.acquire(host_id)?;
        info!(
            "[sd-manifest] 🔒 Domain lock acquired for {} by host {}",
            self.sd_uuid, host_id
        );
        Ok(())
    }

    pub fn release_domain_lock(&self) -> Result<(), ClusterLockError> {
        self.cluster_lock.release()?;
        info!("[sd-manifest] 🔓 Domain lock released for {}", self.sd_uuid);
        Ok(())
    }

    /// True when `host_id` holds the domain lock through this manifest.
    pub fn has_domain_lock(&self, host_id: HostId) -> bool {
        self.cluster_lock.inquire() == Some(host_id)
    }

    /// Reject requests naming another domain.
    pub fn check_domain(&self, sd_uuid: &DomainId) -> Result<(), ManifestError> {
        if *sd_uuid != self.sd_uuid {
            return Err(ManifestError::DomainMismatch {
                expected: self.sd_uuid,
                got: *sd_uuid,
            });
        }
        Ok(())
    }
}
