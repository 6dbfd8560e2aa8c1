//! # Volume Metadata
//!
//! The per-volume record: owning domain and image, parent, declared capacity
//! and format flags. File domains keep it in `<volume>.meta` as `KEY=VALUE`
//! lines terminated by `EOF`. Capacity is stored in 512-byte sectors.

use super::errors::ManifestError;
use super::identity::{DomainId, ImageId, VolumeId};
use super::layout::BLANK_UUID;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unit of the `SIZE` field.
pub const SECTOR_SIZE: u64 = 512;

const MDK_DOMAIN: &str = "DOMAIN";
const MDK_IMAGE: &str = "IMAGE";
const MDK_PUUID: &str = "PUUID";
const MDK_SIZE: &str = "SIZE";
const MDK_FORMAT: &str = "FORMAT";
const MDK_TYPE: &str = "TYPE";
const MDK_VOLTYPE: &str = "VOLTYPE";
const MDK_DISKTYPE: &str = "DISKTYPE";
const MDK_DESCRIPTION: &str = "DESCRIPTION";
const MDK_LEGALITY: &str = "LEGALITY";
const MDK_CTIME: &str = "CTIME";
const MDK_GEN: &str = "GEN";
const MD_EOF: &str = "EOF";

macro_rules! metadata_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} {:?}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

metadata_enum!(
    /// Image format of the volume data.
    VolumeFormat { Raw => "RAW", Cow => "COW" }
);

metadata_enum!(
    /// Allocation policy.
    AllocationPolicy { Preallocated => "PREALLOCATED", Sparse => "SPARSE" }
);

metadata_enum!(
    /// Position of the volume in its chain.
    VolumeRole { Leaf => "LEAF", Internal => "INTERNAL", Shared => "SHARED" }
);

metadata_enum!(
    /// Whether the volume content can be trusted.
    Legality { Legal => "LEGAL", Illegal => "ILLEGAL" }
);

/// Volume metadata record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMetadata {
    pub domain: DomainId,
    pub image: ImageId,
    pub parent: Option<VolumeId>,
    /// Declared virtual size in bytes, a multiple of `SECTOR_SIZE`.
    pub capacity: u64,
    pub format: VolumeFormat,
    pub allocation: AllocationPolicy,
    pub role: VolumeRole,
    pub disk_type: String,
    pub description: String,
    pub legality: Legality,
    /// Creation time, seconds since the epoch.
    pub ctime: u64,
    /// Generation, bumped by each metadata-changing operation.
    pub generation: u64,
}

impl VolumeMetadata {
    /// Metadata for a new sparse raw leaf.
    ///
    /// `capacity` is rounded up to whole sectors. Fails with
    /// `InvalidCapacity` when the rounded size does not fit in a `u64`.
    pub fn new(domain: DomainId, image: ImageId, capacity: u64) -> Result<Self, ManifestError> {
        let rounded = capacity
            .div_ceil(SECTOR_SIZE)
            .checked_mul(SECTOR_SIZE)
            .ok_or(ManifestError::InvalidCapacity(capacity))?;
        let ctime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(Self {
            domain,
            image,
            parent: None,
            capacity: rounded,
            format: VolumeFormat::Raw,
            allocation: AllocationPolicy::Sparse,
            role: VolumeRole::Leaf,
            disk_type: "DATA".to_string(),
            description: String::new(),
            legality: Legality::Legal,
            ctime,
            generation: 0,
        })
    }

    /// Set the parent volume.
    pub fn with_parent(mut self, parent: Option<VolumeId>) -> Self {
        self.parent = parent;
        self
    }

    /// Serialize to the on-disk text form.
    pub fn to_text(&self) -> String {
        let parent = self
            .parent
            .map(|p| p.to_string())
            .unwrap_or_else(|| BLANK_UUID.to_string());
        let fields: [(&str, String); 12] = [
            (MDK_CTIME, self.ctime.to_string()),
            (MDK_DESCRIPTION, self.description.clone()),
            (MDK_DISKTYPE, self.disk_type.clone()),
            (MDK_DOMAIN, self.domain.to_string()),
            (MDK_FORMAT, self.format.to_string()),
            (MDK_GEN, self.generation.to_string()),
            (MDK_IMAGE, self.image.to_string()),
            (MDK_LEGALITY, self.legality.to_string()),
            (MDK_PUUID, parent),
            (MDK_SIZE, (self.capacity / SECTOR_SIZE).to_string()),
            (MDK_TYPE, self.allocation.to_string()),
            (MDK_VOLTYPE, self.role.to_string()),
        ];

        let mut text = String::new();
        for (key, value) in fields {
            text.push_str(key);
            text.push('=');
            text.push_str(&value);
            text.push('\n');
        }
        text.push_str(MD_EOF);
        text.push('\n');
        text
    }

    /// Parse the on-disk text form of `volume`'s metadata.
    pub fn from_text(volume: VolumeId, text: &str) -> Result<Self, ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidVolumeMetadata { volume, reason };

        let mut fields = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line == MD_EOF {
                break;
            }
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(format!("line without '=': {:?}", line)))?;
            fields.insert(key, value);
        }

        let field = |key: &str| {
            fields
                .get(key)
                .copied()
                .ok_or_else(|| invalid(format!("missing {}", key)))
        };
        fn parsed<T: FromStr>(key: &str, raw: &str) -> Result<T, String> {
            raw.parse::<T>()
                .map_err(|_| format!("bad {} value {:?}", key, raw))
        }

        let parent_raw = field(MDK_PUUID)?;
        let parent = parsed::<VolumeId>(MDK_PUUID, parent_raw).map_err(invalid)?;
        let parent = (parent.as_uuid() != &BLANK_UUID).then_some(parent);
        let sectors = parsed::<u64>(MDK_SIZE, field(MDK_SIZE)?).map_err(invalid)?;

        Ok(Self {
            domain: parsed(MDK_DOMAIN, field(MDK_DOMAIN)?).map_err(invalid)?,
            image: parsed(MDK_IMAGE, field(MDK_IMAGE)?).map_err(invalid)?,
            parent,
            capacity: sectors.saturating_mul(SECTOR_SIZE),
            format: field(MDK_FORMAT)?.parse().map_err(invalid)?,
            allocation: field(MDK_TYPE)?.parse().map_err(invalid)?,
            role: field(MDK_VOLTYPE)?.parse().map_err(invalid)?,
            disk_type: fields.get(MDK_DISKTYPE).copied().unwrap_or("").to_string(),
            description: fields.get(MDK_DESCRIPTION).copied().unwrap_or("").to_string(),
            legality: field(MDK_LEGALITY)?.parse().map_err(invalid)?,
            ctime: parsed(MDK_CTIME, field(MDK_CTIME)?).map_err(invalid)?,
            generation: fields
                .get(MDK_GEN)
                .map(|raw| parsed(MDK_GEN, raw))
                .transpose()
                .map_err(invalid)?
                .unwrap_or(0),
        })
    }
}
