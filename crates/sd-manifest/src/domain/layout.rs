//! # Domain Layout
//!
//! Names shared by every host that touches a domain: directory names of the
//! file layout, special logical volumes of the block layout and the LV/VG tag
//! prefixes used as persistent records.

use uuid::Uuid;

/// Domain metadata area (directory on file domains).
pub const DOMAIN_META_DATA: &str = "dom_md";

/// Image directory (file domains).
pub const DOMAIN_IMAGES: &str = "images";

/// Domain metadata file / LV name.
pub const METADATA: &str = "metadata";
/// Lease area used by the cluster lock.
pub const LEASES: &str = "leases";
/// Host id area of the cluster lock.
pub const IDS: &str = "ids";
/// Mailbox areas.
pub const INBOX: &str = "inbox";
pub const OUTBOX: &str = "outbox";
/// Master filesystem LV (block domains).
pub const MASTER: &str = "master";
/// External leases volume.
pub const XLEASES: &str = "xleases";

/// LVs of a block domain that never hold volume data.
pub const SPECIAL_LVS: &[&str] = &[METADATA, LEASES, IDS, INBOX, OUTBOX, MASTER, XLEASES];

/// Pseudo image holding ISO files on ISO domains.
pub const ISO_IMAGE_UUID: Uuid = Uuid::from_u128(0x11111111_1111_1111_1111_111111111111);

/// Parent id of a volume without a parent.
pub const BLANK_UUID: Uuid = Uuid::nil();

/// Prefix of an image that has been deleted but not yet purged.
pub const REMOVED_IMAGE_PREFIX: &str = "_remove_me_";

/// File volume companions.
pub const META_FILE_EXT: &str = ".meta";
pub const LEASE_FILE_EXT: &str = ".lease";

/// LV tag recording the metadata slot offset: `MD_<offset>`.
pub const TAG_PREFIX_MD: &str = "MD_";
/// LV tag recording the metadata slot size in blocks: `MS_<blocks>`.
pub const TAG_PREFIX_MDNUMBLKS: &str = "MS_";
/// LV tag recording the owning image: `IU_<image>`.
pub const TAG_PREFIX_IMAGE: &str = "IU_";
/// LV tag recording the parent volume: `PU_<volume>`.
pub const TAG_PREFIX_PARENT: &str = "PU_";

/// VG tag prefix carrying block domain metadata: `MDT_<KEY>=<VALUE>`.
pub const VG_METADATA_TAG_PREFIX: &str = "MDT_";

/// Sizes of the special LVs created with a block domain, in MiB.
pub const SPECIAL_LV_SIZES_MB: &[(&str, u64)] = &[
    (METADATA, 128),
    (LEASES, 2048),
    (IDS, 8),
    (INBOX, 16),
    (OUTBOX, 16),
    (MASTER, 1024),
    (XLEASES, 1024),
];

pub const MIB: u64 = 1024 * 1024;

/// True for LVs that are part of the domain itself.
pub fn is_special_lv(name: &str) -> bool {
    SPECIAL_LVS.contains(&name)
}

/// Name under which a deleted image waits for purge.
pub fn removed_image_name(image: &impl std::fmt::Display) -> String {
    format!("{}{}", REMOVED_IMAGE_PREFIX, image)
}
