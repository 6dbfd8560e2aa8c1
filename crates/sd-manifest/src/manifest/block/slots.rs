//! # Metadata Slot Allocator
//!
//! Picks the lowest free metadata slot for a new volume. The scan of LV tags
//! and the caller's use of the slot (normally writing the `MD_` tag) run under
//! a process-local lock, so two threads of this host never get the same slot.
//! Other hosts are not excluded; see `crate::domain::slots`.

use std::ops::Deref;

use parking_lot::MutexGuard;
use tracing::debug;

use super::BlockManifest;
use crate::domain::errors::ManifestResult;
use crate::domain::identity::VolumeId;
use crate::domain::layout::is_special_lv;
use crate::domain::slots::{find_free_slot, parse_slot_tags, OccupiedSlot};

/// A selected metadata slot. The allocation lock is held until drop.
#[must_use = "the slot is only reserved while the guard is alive"]
pub struct MetadataSlotGuard<'a> {
    slot: u64,
    _lock: MutexGuard<'a, ()>,
}

impl MetadataSlotGuard<'_> {
    pub fn slot(&self) -> u64 {
        self.slot
    }
}

impl Deref for MetadataSlotGuard<'_> {
    type Target = u64;

    fn deref(&self) -> &u64 {
        &self.slot
    }
}

impl BlockManifest {
    /// Select a free run of `slot_count` slots and hold the allocation lock.
    ///
    /// Blocks while another thread of this process holds a slot guard.
    pub fn acquire_volume_metadata_slot(
        &self,
        volume: Option<&VolumeId>,
        slot_count: u64,
    ) -> ManifestResult<MetadataSlotGuard<'_>> {
        let lock = self.lv_tag_meta_slot_lock.lock();

        let occupied = self.occupied_metadata_slots()?;
        let reserved = self.core.config().reserved_metadata_slots;
        let slot = find_free_slot(&occupied, reserved, slot_count);

        match volume {
            Some(volume) => debug!(
                "[sd-manifest] Metadata slot {} (+{}) selected for volume {}",
                slot,
                slot_count.max(1) - 1,
                volume
            ),
            None => debug!("[sd-manifest] Metadata slot {} selected", slot),
        }

        Ok(MetadataSlotGuard { slot, _lock: lock })
    }

    /// Run `body` with a selected slot while holding the allocation lock.
    pub fn with_volume_metadata_slot<T, F>(
        &self,
        volume: Option<&VolumeId>,
        slot_count: u64,
        body: F,
    ) -> ManifestResult<T>
    where
        F: FnOnce(u64) -> ManifestResult<T>,
    {
        let guard = self.acquire_volume_metadata_slot(volume, slot_count)?;
        body(guard.slot())
    }

    /// Non-blocking probe of the allocation lock.
    ///
    /// `None` means another allocation is in progress on this host.
    pub fn try_lock_slot_allocation(&self) -> Option<MutexGuard<'_, ()>> {
        self.lv_tag_meta_slot_lock.try_lock()
    }

    /// Slots recorded on the domain's volume LVs, sorted by offset.
    pub fn occupied_metadata_slots(&self) -> ManifestResult<Vec<OccupiedSlot>> {
        let mut occupied: Vec<OccupiedSlot> = self
            .lvm
            .list_lvs(&self.vg_name)?
            .iter()
            .filter(|lv| !is_special_lv(&lv.name))
            .filter_map(|lv| parse_slot_tags(lv.tags.iter().map(String::as_str), 1))
            .collect();
        occupied.sort();
        Ok(occupied)
    }
}
