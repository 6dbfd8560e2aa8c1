//! # Block Domain Flows
//!
//! Block domains on the fake LVM: slot allocation under thread contention,
//! the pool manager's image lifecycle, and manifests reloaded from VG tags.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use sd_manifest::adapters::DEFAULT_EXTENT_SIZE;
    use sd_manifest::{
        BlockManifest, BlockManifestDependencies, ClusterLock, ClusterLockError, DomainId,
        DomainLock, FakeLvm, ImageId, InMemoryClusterLock, LvmBackend, ManifestConfig,
        ManifestError, StorageDomainManifest, VolumeId,
    };

    use crate::init_test_logging;

    const VOLSIZE: u64 = 256 * 1024 * 1024;

    struct Env {
        _dev: tempfile::TempDir,
        lvm: Arc<FakeLvm>,
        lock: Arc<InMemoryClusterLock>,
        manifest: Arc<BlockManifest>,
    }

    fn deps(lvm: &Arc<FakeLvm>, lock: &Arc<InMemoryClusterLock>) -> BlockManifestDependencies {
        BlockManifestDependencies {
            lvm: lvm.clone(),
            cluster_lock: lock.clone(),
        }
    }

    fn block_domain() -> Env {
        init_test_logging();
        let dev = tempfile::tempdir().unwrap();
        let lvm = Arc::new(FakeLvm::new(dev.path()));
        let sd_uuid = DomainId::random();
        lvm.create_vg(&sd_uuid.to_string(), DEFAULT_EXTENT_SIZE);
        let lock = Arc::new(InMemoryClusterLock::new(sd_uuid.to_string()));

        let manifest =
            BlockManifest::create(sd_uuid, 5, deps(&lvm, &lock), ManifestConfig::default())
                .unwrap();
        Env {
            _dev: dev,
            lvm,
            lock,
            manifest: Arc::new(manifest),
        }
    }

    // =========================================================================
    // METADATA SLOTS
    // =========================================================================

    #[test]
    fn test_parallel_volume_creation_never_shares_a_slot() {
        let env = block_domain();
        let img = ImageId::random();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let manifest = Arc::clone(&env.manifest);
                thread::spawn(move || {
                    let volume = VolumeId::random();
                    let slot = manifest.create_volume(&img, &volume, VOLSIZE, None)?;
                    Ok::<_, ManifestError>((volume, slot))
                })
            })
            .collect();
        let created: Vec<(VolumeId, u64)> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let slots: HashSet<u64> = created.iter().map(|(_, slot)| *slot).collect();
        assert_eq!(slots.len(), created.len());
        assert_eq!(slots, (4..20).collect::<HashSet<u64>>());

        for (volume, slot) in &created {
            assert_eq!(
                env.manifest.get_volume_metadata_slot(volume).unwrap().offset,
                *slot
            );
        }
    }

    #[test]
    fn test_purged_slots_are_refilled_lowest_first() {
        let env = block_domain();
        let sd_uuid = env.manifest.sd_uuid();
        let (img_a, img_b) = (ImageId::random(), ImageId::random());
        let vol_a = VolumeId::random();

        assert_eq!(env.manifest.create_volume(&img_a, &vol_a, VOLSIZE, None).unwrap(), 4);
        assert_eq!(
            env.manifest
                .create_volume(&img_b, &VolumeId::random(), VOLSIZE, None)
                .unwrap(),
            5
        );

        env.manifest.delete_image(&sd_uuid, &img_a, None).unwrap();
        env.manifest.purge_image(&sd_uuid, &img_a, &[vol_a], false).unwrap();

        assert_eq!(
            env.manifest
                .create_volume(&img_b, &VolumeId::random(), VOLSIZE, None)
                .unwrap(),
            4
        );
    }

    #[test]
    fn test_slot_probe_while_allocation_in_progress() {
        let env = block_domain();
        let guard = env.manifest.acquire_volume_metadata_slot(None, 1).unwrap();
        assert_eq!(guard.slot(), 4);

        let manifest = Arc::clone(&env.manifest);
        let probed = thread::spawn(move || manifest.try_lock_slot_allocation().is_some())
            .join()
            .unwrap();
        assert!(!probed);

        drop(guard);
        assert!(env.manifest.try_lock_slot_allocation().is_some());
    }

    // =========================================================================
    // POOL MANAGER FLOWS
    // =========================================================================

    #[test]
    fn test_pool_manager_image_lifecycle() {
        let env = block_domain();
        let sd_uuid = env.manifest.sd_uuid();
        let img = ImageId::random();
        let (base, top) = (VolumeId::random(), VolumeId::random());

        env.manifest.init_domain_lock().unwrap();
        env.manifest
            .with_domain_lock(1, || -> Result<(), ManifestError> {
                env.manifest.create_volume(&img, &base, VOLSIZE, None)?;
                env.manifest.create_volume(&img, &top, VOLSIZE, Some(base))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(env.lock.inquire(), None);

        assert!(env.manifest.get_all_images().unwrap().contains(&img));
        env.lvm.activate_lv(env.manifest.vg_name(), &top.to_string()).unwrap();
        assert_eq!(env.manifest.get_vsize(&img, &top).unwrap(), VOLSIZE);
        assert_eq!(env.manifest.get_vsize(&img, &base).unwrap(), VOLSIZE);

        env.manifest
            .with_domain_lock(1, || -> Result<(), ManifestError> {
                env.manifest.delete_image(&sd_uuid, &img, None)?;
                env.manifest.purge_image(&sd_uuid, &img, &[], true)
            })
            .unwrap();

        assert!(env.manifest.get_all_images().unwrap().is_empty());
        assert!(env.manifest.occupied_metadata_slots().unwrap().is_empty());
        assert!(!env.lvm.lv_path(env.manifest.vg_name(), &top.to_string()).exists());
    }

    #[test]
    fn test_second_holder_is_refused() {
        let env = block_domain();
        env.manifest.init_domain_lock().unwrap();

        let guard = env.manifest.domain_lock(1).unwrap();
        let err = env.manifest.acquire_domain_lock(2).unwrap_err();
        assert!(matches!(err, ClusterLockError::AlreadyHeld { holder: Some(1), .. }));
        drop(guard);

        env.manifest.domain_lock(2).unwrap().release().unwrap();
    }

    #[test]
    fn test_reopened_manifest_keeps_domain_state() {
        let env = block_domain();
        let img = ImageId::random();
        env.manifest
            .create_volume(&img, &VolumeId::random(), VOLSIZE, None)
            .unwrap();

        let reopened = BlockManifest::open(
            env.manifest.sd_uuid(),
            deps(&env.lvm, &env.lock),
            ManifestConfig::default(),
        )
        .unwrap();
        assert_eq!(reopened.get_metadata(), env.manifest.get_metadata());
        assert_eq!(reopened.get_all_images().unwrap(), env.manifest.get_all_images().unwrap());
        assert_eq!(reopened.get_monitoring_path(), env.manifest.get_monitoring_path());

        // The slot record lives on the LVs, so a new manifest continues after it.
        let slot = reopened
            .create_volume(&img, &VolumeId::random(), VOLSIZE, None)
            .unwrap();
        assert_eq!(slot, 5);
    }
}
