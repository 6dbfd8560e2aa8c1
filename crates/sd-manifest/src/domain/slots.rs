//! # Metadata Slots
//!
//! Block domains keep one metadata record per volume in a fixed-size area on
//! the `metadata` LV. A volume's slot is recorded as an `MD_<offset>` tag on
//! the volume's own LV, optionally with `MS_<blocks>` when the record spans
//! more than one slot.
//!
//! The first slots belong to the domain itself and are never handed out.
//! Selection is first fit: the lowest offset with enough free room, so a slot
//! freed by a deleted volume is reused by the next allocation.
//!
//! Offsets are unique per host only. Two hosts may pick the same number, which
//! is harmless because each tag lives on that volume's private LV.

use super::layout::{TAG_PREFIX_MD, TAG_PREFIX_MDNUMBLKS};

/// A run of slots recorded on one LV.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OccupiedSlot {
    /// First slot of the run.
    pub offset: u64,
    /// Number of slots in the run.
    pub size: u64,
}

impl OccupiedSlot {
    /// One past the last slot of the run.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Tag recording a slot offset.
pub fn md_tag(offset: u64) -> String {
    format!("{}{}", TAG_PREFIX_MD, offset)
}

/// Tag recording a slot size, only written for multi-slot records.
pub fn mdnumblks_tag(size: u64) -> String {
    format!("{}{}", TAG_PREFIX_MDNUMBLKS, size)
}

/// Read the slot recorded in an LV's tags.
///
/// Returns `None` when no parsable `MD_` tag is present. A missing or
/// unparsable `MS_` tag means `default_size`.
pub fn parse_slot_tags<'a, I>(tags: I, default_size: u64) -> Option<OccupiedSlot>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut offset = None;
    let mut size = default_size;

    for tag in tags {
        if let Some(raw) = tag.strip_prefix(TAG_PREFIX_MD) {
            offset = raw.parse::<u64>().ok().or(offset);
        } else if let Some(raw) = tag.strip_prefix(TAG_PREFIX_MDNUMBLKS) {
            size = raw.parse::<u64>().unwrap_or(default_size);
        }
    }

    offset.map(|offset| OccupiedSlot { offset, size })
}

/// First free run of `slot_count` slots at or after `first_free`.
///
/// `occupied` must be sorted by offset.
pub fn find_free_slot(occupied: &[OccupiedSlot], first_free: u64, slot_count: u64) -> u64 {
    let slot_count = slot_count.max(1);
    let mut free = first_free;

    for slot in occupied {
        if slot.offset >= free.saturating_add(slot_count) {
            break;
        }
        free = free.max(slot.end());
    }

    free
}
