//! # File Domain Flows
//!
//! A file domain shared by two "hosts" (two manifests over the same
//! directory, each with its own lease-file lock), and the full image
//! lifecycle as the pool manager drives it.

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use sd_manifest::{
        ClusterLockError, DomainId, DomainLock, FileManifest, FileManifestDependencies,
        FlockClusterLock, FlockLockConfig, ImageId, LocalFileOperations, ManifestConfig,
        ManifestError, StorageDomainManifest, VolumeId,
    };

    use crate::init_test_logging;

    const VOLSIZE: u64 = 256 * 1024 * 1024;

    fn lock_config() -> FlockLockConfig {
        FlockLockConfig::default()
            .with_acquire_timeout(Duration::from_millis(200))
            .with_retry_delays(Duration::from_millis(10), Duration::from_millis(50))
    }

    fn deps(domain_dir: &Path) -> FileManifestDependencies {
        FileManifestDependencies {
            file_ops: Arc::new(LocalFileOperations::new()),
            cluster_lock: Arc::new(FlockClusterLock::for_domain(domain_dir, lock_config())),
        }
    }

    /// Create a domain as host A and open it as host B.
    fn two_hosts(root: &Path) -> (FileManifest, FileManifest) {
        let sd_uuid = DomainId::random();
        let domain_dir = root.join(sd_uuid.to_string());
        let host_a = FileManifest::create(
            &domain_dir,
            sd_uuid,
            5,
            deps(&domain_dir),
            ManifestConfig::default(),
        )
        .unwrap();
        let host_b =
            FileManifest::open(&domain_dir, deps(&domain_dir), ManifestConfig::default()).unwrap();
        (host_a, host_b)
    }

    // =========================================================================
    // DOMAIN LOCK BETWEEN HOSTS
    // =========================================================================

    #[test]
    fn test_domain_lock_excludes_second_host() {
        init_test_logging();
        let root = tempfile::tempdir().unwrap();
        let (host_a, host_b) = two_hosts(root.path());
        host_a.init_domain_lock().unwrap();
        host_b.init_domain_lock().unwrap();

        {
            let _guard = host_a.domain_lock(1).unwrap();
            let err = host_b.acquire_domain_lock(2).unwrap_err();
            assert!(matches!(err, ClusterLockError::Timeout { .. }));
        }

        // Host A's guard is gone, so host B gets in.
        let guard = host_b.domain_lock(2).unwrap();
        assert!(host_b.core().has_domain_lock(2));
        guard.release().unwrap();
    }

    #[test]
    fn test_lock_released_when_critical_section_fails() {
        init_test_logging();
        let root = tempfile::tempdir().unwrap();
        let (host_a, host_b) = two_hosts(root.path());
        host_a.init_domain_lock().unwrap();

        let sd_uuid = host_a.sd_uuid();
        let result = host_a.with_domain_lock(1, || {
            host_a.delete_image(&DomainId::random(), &ImageId::random(), None)
        });
        assert!(matches!(result, Err(ManifestError::DomainMismatch { .. })));

        host_b
            .with_domain_lock(2, || host_b.get_all_images())
            .unwrap();
        assert_eq!(host_b.sd_uuid(), sd_uuid);
    }

    // =========================================================================
    // IMAGE LIFECYCLE
    // =========================================================================

    #[test]
    fn test_image_lifecycle_seen_by_both_hosts() {
        init_test_logging();
        let root = tempfile::tempdir().unwrap();
        let (host_a, host_b) = two_hosts(root.path());
        let sd_uuid = host_a.sd_uuid();
        let img = ImageId::random();
        let (base, top) = (VolumeId::random(), VolumeId::random());

        host_a.init_domain_lock().unwrap();
        host_a
            .with_domain_lock(1, || -> Result<(), ManifestError> {
                host_a.create_volume(&img, &base, VOLSIZE, None)?;
                host_a.create_volume(&img, &top, VOLSIZE, Some(base))?;
                Ok(())
            })
            .unwrap();

        assert!(host_b.get_all_images().unwrap().contains(&img));
        assert_eq!(host_b.get_vsize(&img, &top).unwrap(), VOLSIZE);
        assert_eq!(host_b.get_valloc_size(&img, &top).unwrap(), 0);

        host_b.delete_image(&sd_uuid, &img, Some(&[base, top])).unwrap();
        assert!(host_a.get_all_images().unwrap().is_empty());

        // Both hosts run the purge; the slower one finds nothing left.
        host_a.purge_image(&sd_uuid, &img, &[base, top], false).unwrap();
        host_b.purge_image(&sd_uuid, &img, &[base, top], false).unwrap();
        assert!(!host_a.deleted_image_path(&img).exists());
    }

    #[test]
    fn test_metadata_update_visible_after_reopen() {
        init_test_logging();
        let root = tempfile::tempdir().unwrap();
        let (host_a, host_b) = two_hosts(root.path());

        let updated = host_a.get_metadata().with("ROLE", "Regular");
        host_a.replace_metadata(updated.clone()).unwrap();

        // Host B keeps its cached copy until it reloads.
        assert!(host_b.get_metadata_param("ROLE").is_err());
        let reloaded = FileManifest::open(
            host_b.domain_dir(),
            deps(host_b.domain_dir()),
            ManifestConfig::default(),
        )
        .unwrap();
        assert_eq!(reloaded.get_metadata(), updated);
    }
}
