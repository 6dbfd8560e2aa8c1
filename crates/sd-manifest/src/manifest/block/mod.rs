//! # Block Domain Manifest
//!
//! A block domain is a volume group named after the domain. Domain metadata
//! lives in `MDT_` VG tags, each volume is one LV, and an LV's tags record
//! its image (`IU_`), parent (`PU_`) and metadata slot (`MD_`, `MS_`).
//!
//! The special LVs (`metadata`, `leases`, `ids`, ...) belong to the domain
//! and are never reported as volumes.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::domain::config::ManifestConfig;
use crate::domain::errors::{BackendError, ClusterLockError, ManifestError, ManifestResult};
use crate::domain::identity::{DomainId, HostId, ImageId, VolumeId};
use crate::domain::layout::{
    is_special_lv, removed_image_name, BLANK_UUID, METADATA, MIB, REMOVED_IMAGE_PREFIX,
    SPECIAL_LV_SIZES_MB, TAG_PREFIX_IMAGE, TAG_PREFIX_PARENT, VG_METADATA_TAG_PREFIX,
};
use crate::domain::metadata::{
    DomainMetadata, DMDK_LOGBLKSIZE, DMDK_PHYBLKSIZE, DMDK_SDUUID, DMDK_VERSION,
};
use crate::domain::slots::{md_tag, mdnumblks_tag, parse_slot_tags, OccupiedSlot};
use crate::manifest::core::ManifestCore;
use crate::ports::inbound::{DomainLock, StorageDomainManifest};
use crate::ports::outbound::{ClusterLock, LogicalVolume, LvmBackend};

mod slots;

pub use slots::MetadataSlotGuard;

/// Collaborators of a `BlockManifest`.
pub struct BlockManifestDependencies {
    pub lvm: Arc<dyn LvmBackend>,
    pub cluster_lock: Arc<dyn ClusterLock>,
}

/// Manifest of a block-backed storage domain.
pub struct BlockManifest {
    core: ManifestCore,
    lvm: Arc<dyn LvmBackend>,
    vg_name: String,
    logical_block_size: u64,
    physical_block_size: u64,
    /// Serializes metadata slot selection on this host.
    pub(crate) lv_tag_meta_slot_lock: Mutex<()>,
}

impl BlockManifest {
    /// Build a manifest from already loaded metadata.
    ///
    /// Block sizes come from `LOGBLKSIZE`/`PHYBLKSIZE` when present, else from
    /// `config`, and never change afterwards.
    pub fn new(
        sd_uuid: DomainId,
        metadata: DomainMetadata,
        deps: BlockManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let logical_block_size = block_size(&metadata, DMDK_LOGBLKSIZE)?
            .unwrap_or(config.default_logical_block_size);
        let physical_block_size = block_size(&metadata, DMDK_PHYBLKSIZE)?
            .unwrap_or(config.default_physical_block_size);

        Ok(Self {
            vg_name: sd_uuid.to_string(),
            core: ManifestCore::new(sd_uuid, metadata, deps.cluster_lock, config),
            lvm: deps.lvm,
            logical_block_size,
            physical_block_size,
            lv_tag_meta_slot_lock: Mutex::new(()),
        })
    }

    /// Load the manifest of an existing domain from its VG tags.
    pub fn open(
        sd_uuid: DomainId,
        deps: BlockManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let vg = deps.lvm.get_vg(&sd_uuid.to_string())?;
        let metadata = DomainMetadata::from_tags(&vg.tags, VG_METADATA_TAG_PREFIX)?;
        debug!(
            "[sd-manifest] Opened block domain {} ({} metadata keys)",
            sd_uuid,
            metadata.len()
        );
        Self::new(sd_uuid, metadata, deps, config)
    }

    /// Turn the existing VG named after `sd_uuid` into an empty domain.
    pub fn create(
        sd_uuid: DomainId,
        version: i64,
        deps: BlockManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let vg_name = sd_uuid.to_string();
        for (name, size_mb) in SPECIAL_LV_SIZES_MB {
            deps.lvm.create_lv(&vg_name, name, size_mb * MIB, &[])?;
        }

        let metadata = DomainMetadata::new()
            .with(DMDK_SDUUID, vg_name.clone())
            .with(DMDK_VERSION, version)
            .with(DMDK_LOGBLKSIZE, block_size_value(config.default_logical_block_size)?)
            .with(DMDK_PHYBLKSIZE, block_size_value(config.default_physical_block_size)?);
        let manifest = Self::new(sd_uuid, metadata.clone(), deps, config)?;
        manifest.write_metadata(&metadata)?;

        info!("[sd-manifest] Created block domain {}", sd_uuid);
        Ok(manifest)
    }

    pub fn vg_name(&self) -> &str {
        &self.vg_name
    }

    /// Logical block size fixed at construction.
    pub fn logical_block_size(&self) -> u64 {
        self.logical_block_size
    }

    /// Physical block size fixed at construction.
    pub fn physical_block_size(&self) -> u64 {
        self.physical_block_size
    }

    /// Create a volume LV tagged with its image, parent and a fresh metadata slot.
    ///
    /// Returns the slot offset.
    pub fn create_volume(
        &self,
        image: &ImageId,
        volume: &VolumeId,
        capacity: u64,
        parent: Option<VolumeId>,
    ) -> ManifestResult<u64> {
        let slot_count = self.core.config().volume_metadata_slot_blocks;
        let parent = parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| BLANK_UUID.to_string());

        self.with_volume_metadata_slot(Some(volume), slot_count, |slot| {
            let mut tags = vec![
                md_tag(slot),
                format!("{}{}", TAG_PREFIX_IMAGE, image),
                format!("{}{}", TAG_PREFIX_PARENT, parent),
            ];
            if slot_count > 1 {
                tags.push(mdnumblks_tag(slot_count));
            }
            self.lvm
                .create_lv(&self.vg_name, &volume.to_string(), capacity, &tags)?;
            debug!(
                "[sd-manifest] Created volume {}/{} in metadata slot {}",
                image, volume, slot
            );
            Ok(slot)
        })
    }

    /// Metadata slot recorded on a volume's LV.
    pub fn get_volume_metadata_slot(&self, volume: &VolumeId) -> ManifestResult<OccupiedSlot> {
        let lv = self.lvm.get_lv(&self.vg_name, &volume.to_string())?;
        parse_slot_tags(lv.tags.iter().map(String::as_str), 1)
            .ok_or(ManifestError::MetadataSlotNotFound(*volume))
    }

    fn volume_lv(&self, image: &ImageId, volume: &VolumeId) -> ManifestResult<LogicalVolume> {
        self.lvm
            .get_lv(&self.vg_name, &volume.to_string())
            .map_err(|e| {
                if e.is_not_found() {
                    ManifestError::VolumeNotFound {
                        image: *image,
                        volume: *volume,
                    }
                } else {
                    e.into()
                }
            })
    }

    /// Volume LVs carrying `tag`.
    fn lvs_tagged(&self, tag: &str) -> ManifestResult<Vec<LogicalVolume>> {
        Ok(self
            .lvm
            .list_lvs(&self.vg_name)?
            .into_iter()
            .filter(|lv| !is_special_lv(&lv.name) && lv.has_tag(tag))
            .collect())
    }

    /// Names of the hinted volumes that belong to `image`.
    ///
    /// Missing LVs and LVs without `image_tag` are skipped, so a wrong hint
    /// never marks another image's volume for removal.
    fn hinted_image_lvs(
        &self,
        image: &ImageId,
        volumes: &[VolumeId],
        image_tag: &str,
    ) -> ManifestResult<Vec<String>> {
        let mut names = Vec::with_capacity(volumes.len());
        for volume in volumes {
            match self.lvm.get_lv(&self.vg_name, &volume.to_string()) {
                Ok(lv) if lv.has_tag(image_tag) => names.push(lv.name),
                Ok(_) => warn!(
                    "[sd-manifest] Volume {} is not part of image {}, skipping",
                    volume, image
                ),
                Err(e) if e.is_not_found() => {
                    debug!("[sd-manifest] Volume {}/{} already gone", image, volume);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(names)
    }

    fn write_metadata(&self, metadata: &DomainMetadata) -> ManifestResult<()> {
        let vg = self.lvm.get_vg(&self.vg_name)?;
        let stale: Vec<String> = vg
            .tags
            .into_iter()
            .filter(|t| t.starts_with(VG_METADATA_TAG_PREFIX))
            .collect();
        self.lvm.change_vg_tags(
            &self.vg_name,
            &stale,
            &metadata.to_tags(VG_METADATA_TAG_PREFIX)?,
        )?;
        Ok(())
    }
}

impl DomainLock for BlockManifest {
    fn acquire_domain_lock(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        self.core.acquire_domain_lock(host_id)
    }

    fn release_domain_lock(&self) -> Result<(), ClusterLockError> {
        self.core.release_domain_lock()
    }
}

impl StorageDomainManifest for BlockManifest {
    fn core(&self) -> &ManifestCore {
        &self.core
    }

    fn replace_metadata(&self, metadata: DomainMetadata) -> ManifestResult<()> {
        self.write_metadata(&metadata)?;
        self.core.replace_cached_metadata(metadata);
        Ok(())
    }

    fn get_monitoring_path(&self) -> PathBuf {
        self.lvm.lv_path(&self.vg_name, METADATA)
    }

    fn get_all_images(&self) -> ManifestResult<BTreeSet<ImageId>> {
        let lvs = self.lvm.list_lvs(&self.vg_name)?;
        Ok(lvs
            .iter()
            .filter(|lv| !is_special_lv(&lv.name))
            .flat_map(|lv| lv.tag_values(TAG_PREFIX_IMAGE))
            .filter(|value| !value.starts_with(REMOVED_IMAGE_PREFIX))
            .filter_map(|value| value.parse::<ImageId>().ok())
            .collect())
    }

    fn get_vsize(&self, image: &ImageId, volume: &VolumeId) -> ManifestResult<u64> {
        let lv = self.volume_lv(image, volume)?;
        let path = self.lvm.lv_path(&self.vg_name, &lv.name);

        match File::open(&path) {
            Ok(mut device) => device
                .seek(SeekFrom::End(0))
                .map_err(|e| ManifestError::from(BackendError::io(&path, e))),
            // Inactive LV: no device node, fall back to the recorded extents.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(lv.size()),
            Err(e) => Err(BackendError::io(&path, e).into()),
        }
    }

    fn get_valloc_size(&self, image: &ImageId, volume: &VolumeId) -> ManifestResult<u64> {
        Ok(self.volume_lv(image, volume)?.size())
    }

    fn delete_image(
        &self,
        sd_uuid: &DomainId,
        image: &ImageId,
        volumes: Option<&[VolumeId]>,
    ) -> ManifestResult<()> {
        self.core.check_domain(sd_uuid)?;
        let image_tag = format!("{}{}", TAG_PREFIX_IMAGE, image);
        let removed_tag = format!("{}{}", TAG_PREFIX_IMAGE, removed_image_name(image));

        let names: Vec<String> = match volumes {
            Some(volumes) => self.hinted_image_lvs(image, volumes, &image_tag)?,
            None => self
                .lvs_tagged(&image_tag)?
                .into_iter()
                .map(|lv| lv.name)
                .collect(),
        };
        if names.is_empty() {
            warn!("[sd-manifest] Image {} has no volumes in {}", image, sd_uuid);
            return Ok(());
        }

        for name in &names {
            match self.lvm.change_lv_tags(
                &self.vg_name,
                name,
                std::slice::from_ref(&image_tag),
                std::slice::from_ref(&removed_tag),
            ) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("[sd-manifest] Volume {}/{} already gone", image, name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "[sd-manifest] Image {} marked deleted ({} volumes)",
            image,
            names.len()
        );
        Ok(())
    }

    fn purge_image(
        &self,
        sd_uuid: &DomainId,
        image: &ImageId,
        volumes: &[VolumeId],
        force: bool,
    ) -> ManifestResult<()> {
        self.core.check_domain(sd_uuid)?;

        let mut names: Vec<String> = volumes.iter().map(|v| v.to_string()).collect();
        if force {
            let removed_tag = format!("{}{}", TAG_PREFIX_IMAGE, removed_image_name(image));
            for lv in self.lvs_tagged(&removed_tag)? {
                if !names.contains(&lv.name) {
                    names.push(lv.name);
                }
            }
        }

        let mut removed = 0;
        for name in &names {
            match self.lvm.remove_lv(&self.vg_name, name) {
                Ok(()) => removed += 1,
                Err(e) if e.is_not_found() => {
                    debug!("[sd-manifest] Volume {}/{} already removed", image, name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if removed == 0 {
            warn!(
                "[sd-manifest] Deleted image {} already removed from {}",
                image, sd_uuid
            );
        } else {
            info!(
                "[sd-manifest] Purged image {} from {} ({} volumes)",
                image, sd_uuid, removed
            );
        }
        Ok(())
    }
}

fn block_size(metadata: &DomainMetadata, key: &str) -> ManifestResult<Option<u64>> {
    metadata
        .get_int(key)?
        .map(|v| {
            u64::try_from(v)
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| {
                    ManifestError::InvalidMetadata(format!("{} out of range: {}", key, v))
                })
        })
        .transpose()
}

fn block_size_value(size: u64) -> ManifestResult<i64> {
    i64::try_from(size)
        .map_err(|_| ManifestError::InvalidMetadata(format!("block size out of range: {}", size)))
}
