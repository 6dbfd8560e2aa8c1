//! # File Domain Manifest
//!
//! A file domain is a directory tree on a shared filesystem:
//!
//! ```text
//! <domain_dir>/
//!   dom_md/{metadata, ids, leases, inbox, outbox}
//!   images/<image>/<volume>{,.meta,.lease}
//!   images/_remove_me_<image>/      deleted, waiting for purge
//! ```
//!
//! All filesystem access goes through the `FileOperations` port.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::config::ManifestConfig;
use crate::domain::errors::{BackendError, ClusterLockError, ManifestError, ManifestResult};
use crate::domain::identity::{DomainId, HostId, ImageId, VolumeId};
use crate::domain::layout::{
    removed_image_name, DOMAIN_IMAGES, DOMAIN_META_DATA, IDS, INBOX, ISO_IMAGE_UUID,
    LEASES, LEASE_FILE_EXT, META_FILE_EXT, METADATA, MIB, OUTBOX,
};
use crate::domain::metadata::{DomainMetadata, DMDK_SDUUID, DMDK_VERSION};
use crate::domain::volume_metadata::VolumeMetadata;
use crate::manifest::core::ManifestCore;
use crate::ports::inbound::{DomainLock, StorageDomainManifest};
use crate::ports::outbound::{ClusterLock, FileOperations};


/// Size of a volume's lease file.
const VOLUME_LEASE_SIZE: u64 = MIB;

/// Collaborators of a `FileManifest`.
pub struct FileManifestDependencies {
    pub file_ops: Arc<dyn FileOperations>,
    pub cluster_lock: Arc<dyn ClusterLock>,
}

/// Manifest of a file-backed storage domain.
pub struct FileManifest {
    core: ManifestCore,
    domain_dir: PathBuf,
    file_ops: Arc<dyn FileOperations>,
}

impl FileManifest {
    /// Build a manifest from already loaded metadata.
    ///
    /// The domain identity is taken from the `SDUUID` key.
    pub fn new(
        domain_dir: impl Into<PathBuf>,
        metadata: DomainMetadata,
        deps: FileManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let sd_uuid = domain_id_of(&metadata)?;
        Ok(Self {
            core: ManifestCore::new(sd_uuid, metadata, deps.cluster_lock, config),
            domain_dir: domain_dir.into(),
            file_ops: deps.file_ops,
        })
    }

    /// Load the manifest of an existing domain from its metadata file.
    pub fn open(
        domain_dir: impl Into<PathBuf>,
        deps: FileManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let domain_dir = domain_dir.into();
        let metafile = domain_dir.join(DOMAIN_META_DATA).join(METADATA);
        let raw = deps.file_ops.read(&metafile)?;
        let text = String::from_utf8(raw).map_err(|e| {
            ManifestError::InvalidMetadata(format!("{}: {}", metafile.display(), e))
        })?;
        let metadata = DomainMetadata::from_lines(text.lines())?;

        let manifest = Self::new(domain_dir, metadata, deps, config)?;
        debug!(
            "[sd-manifest] Opened file domain {} at {}",
            manifest.sd_uuid(),
            manifest.domain_dir.display()
        );
        Ok(manifest)
    }

    /// Lay out a new, empty domain under `domain_dir` and return its manifest.
    pub fn create(
        domain_dir: impl Into<PathBuf>,
        sd_uuid: DomainId,
        version: i64,
        deps: FileManifestDependencies,
        config: ManifestConfig,
    ) -> ManifestResult<Self> {
        let domain_dir = domain_dir.into();
        let md_dir = domain_dir.join(DOMAIN_META_DATA);
        let file_ops = deps.file_ops.clone();

        file_ops.create_dir_all(&md_dir)?;
        file_ops.create_dir_all(&domain_dir.join(DOMAIN_IMAGES))?;
        for name in [IDS, LEASES, INBOX, OUTBOX] {
            let path = md_dir.join(name);
            if !file_ops.exists(&path) {
                file_ops.create_sparse(&path, 0)?;
            }
        }

        let metadata = DomainMetadata::new()
            .with(DMDK_SDUUID, sd_uuid.to_string())
            .with(DMDK_VERSION, version);
        let manifest = Self::new(domain_dir, metadata.clone(), deps, config)?;
        manifest.write_metadata(&metadata)?;

        info!(
            "[sd-manifest] Created file domain {} at {}",
            sd_uuid,
            manifest.domain_dir.display()
        );
        Ok(manifest)
    }

    pub fn domain_dir(&self) -> &Path {
        &self.domain_dir
    }

    /// Directory holding the domain-level metadata files.
    pub fn metadata_path(&self) -> PathBuf {
        self.domain_dir.join(DOMAIN_META_DATA)
    }

    /// The domain metadata file.
    pub fn metafile(&self) -> PathBuf {
        self.metadata_path().join(METADATA)
    }

    pub fn leases_path(&self) -> PathBuf {
        self.metadata_path().join(LEASES)
    }

    pub fn ids_path(&self) -> PathBuf {
        self.metadata_path().join(IDS)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.domain_dir.join(DOMAIN_IMAGES)
    }

    pub fn image_path(&self, image: &ImageId) -> PathBuf {
        self.images_dir().join(image.to_string())
    }

    /// Where a deleted image waits for purge.
    pub fn deleted_image_path(&self, image: &ImageId) -> PathBuf {
        self.images_dir().join(removed_image_name(image))
    }

    /// The ISO pseudo-image directory.
    pub fn iso_domain_images_dir(&self) -> PathBuf {
        self.images_dir().join(ISO_IMAGE_UUID.to_string())
    }

    pub fn volume_path(&self, image: &ImageId, volume: &VolumeId) -> PathBuf {
        self.image_path(image).join(volume.to_string())
    }

    fn volume_meta_path(&self, image: &ImageId, volume: &VolumeId) -> PathBuf {
        with_suffix(&self.volume_path(image, volume), META_FILE_EXT)
    }

    /// Create a sparse volume with its metadata and lease files.
    pub fn create_volume(
        &self,
        image: &ImageId,
        volume: &VolumeId,
        capacity: u64,
        parent: Option<VolumeId>,
    ) -> ManifestResult<VolumeMetadata> {
        let metadata =
            VolumeMetadata::new(self.sd_uuid(), *image, capacity)?.with_parent(parent);
        let vol_path = self.volume_path(image, volume);

        self.file_ops.create_dir_all(&self.image_path(image))?;
        self.file_ops.create_sparse(&vol_path, metadata.capacity)?;
        self.file_ops.write_atomic(
            &with_suffix(&vol_path, META_FILE_EXT),
            metadata.to_text().as_bytes(),
        )?;
        self.file_ops
            .create_sparse(&with_suffix(&vol_path, LEASE_FILE_EXT), VOLUME_LEASE_SIZE)?;

        debug!(
            "[sd-manifest] Created volume {}/{} ({} bytes)",
            image, volume, metadata.capacity
        );
        Ok(metadata)
    }

    pub fn get_volume_metadata(
        &self,
        image: &ImageId,
        volume: &VolumeId,
    ) -> ManifestResult<VolumeMetadata> {
        let raw = self
            .file_ops
            .read(&self.volume_meta_path(image, volume))
            .map_err(|e| volume_error(e, image, volume))?;
        let text = String::from_utf8_lossy(&raw);
        VolumeMetadata::from_text(*volume, &text)
    }

    /// Volumes of an image, found by their metadata files.
    pub fn get_all_volumes(&self, image: &ImageId) -> ManifestResult<Vec<VolumeId>> {
        let names = match self.file_ops.list_dir(&self.image_path(image)) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(names
            .iter()
            .filter_map(|name| name.strip_suffix(META_FILE_EXT))
            .filter_map(|stem| stem.parse::<VolumeId>().ok())
            .collect())
    }

    fn write_metadata(&self, metadata: &DomainMetadata) -> ManifestResult<()> {
        let mut text = metadata.to_lines()?.join("\n");
        text.push('\n');
        self.file_ops.write_atomic(&self.metafile(), text.as_bytes())?;
        Ok(())
    }

    /// Remove `path`, treating a missing file as already removed.
    fn remove_if_present(&self, path: &Path) -> ManifestResult<()> {
        match self.file_ops.remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl DomainLock for FileManifest {
    fn acquire_domain_lock(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        self.core.acquire_domain_lock(host_id)
    }

    fn release_domain_lock(&self) -> Result<(), ClusterLockError> {
        self.core.release_domain_lock()
    }
}

impl StorageDomainManifest for FileManifest {
    fn core(&self) -> &ManifestCore {
        &self.core
    }

    fn replace_metadata(&self, metadata: DomainMetadata) -> ManifestResult<()> {
        self.write_metadata(&metadata)?;
        self.core.replace_cached_metadata(metadata);
        Ok(())
    }

    fn get_monitoring_path(&self) -> PathBuf {
        self.metafile()
    }

    fn get_all_images(&self) -> ManifestResult<BTreeSet<ImageId>> {
        let names = self.file_ops.list_dir(&self.images_dir())?;
        // Deleted images carry a prefix and do not parse as identifiers.
        Ok(names
            .iter()
            .filter_map(|name| name.parse::<ImageId>().ok())
            .collect())
    }

    fn get_vsize(&self, image: &ImageId, volume: &VolumeId) -> ManifestResult<u64> {
        Ok(self.get_volume_metadata(image, volume)?.capacity)
    }

    fn get_valloc_size(&self, image: &ImageId, volume: &VolumeId) -> ManifestResult<u64> {
        self.file_ops
            .allocated_size(&self.volume_path(image, volume))
            .map_err(|e| volume_error(e, image, volume))
    }

    fn delete_image(
        &self,
        sd_uuid: &DomainId,
        image: &ImageId,
        // The rename covers every volume of the image.
        _volumes: Option<&[VolumeId]>,
    ) -> ManifestResult<()> {
        self.core.check_domain(sd_uuid)?;
        let image_dir = self.image_path(image);
        let deleted_dir = self.deleted_image_path(image);

        if !self.file_ops.exists(&image_dir) {
            if self.file_ops.exists(&deleted_dir) {
                debug!("[sd-manifest] Image {} already marked deleted", image);
            } else {
                warn!("[sd-manifest] Image {} not found in {}", image, sd_uuid);
            }
            return Ok(());
        }

        self.file_ops.rename(&image_dir, &deleted_dir)?;
        info!(
            "[sd-manifest] Image {} marked deleted as {}",
            image,
            deleted_dir.display()
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
        let deleted_dir = self.deleted_image_path(image);

        if !self.file_ops.exists(&deleted_dir) {
            warn!(
                "[sd-manifest] Deleted image {} already removed",
                deleted_dir.display()
            );
            return Ok(());
        }

        for volume in volumes {
            let vol_path = deleted_dir.join(volume.to_string());
            self.remove_if_present(&vol_path)?;
            self.remove_if_present(&with_suffix(&vol_path, META_FILE_EXT))?;
            self.remove_if_present(&with_suffix(&vol_path, LEASE_FILE_EXT))?;
        }

        let removed = if force {
            self.file_ops.remove_dir_all(&deleted_dir)
        } else {
            self.file_ops.remove_dir(&deleted_dir)
        };
        match removed {
            Ok(()) => {}
            // A collector may have removed it since the check above.
            Err(e) if e.is_not_found() => {
                warn!(
                    "[sd-manifest] Deleted image {} removed concurrently",
                    deleted_dir.display()
                );
            }
            Err(e) => return Err(e.into()),
        }

        info!("[sd-manifest] Purged image {} from {}", image, sd_uuid);
        Ok(())
    }
}

fn domain_id_of(metadata: &DomainMetadata) -> ManifestResult<DomainId> {
    let raw = metadata.require(DMDK_SDUUID)?.to_string();
    raw.parse()
        .map_err(|_| ManifestError::InvalidMetadata(format!("bad {} {:?}", DMDK_SDUUID, raw)))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn volume_error(e: BackendError, image: &ImageId, volume: &VolumeId) -> ManifestError {
    if e.is_not_found() {
        ManifestError::VolumeNotFound {
            image: *image,
            volume: *volume,
        }
    } else {
        e.into()
    }
}
