//! # Domain Layer
//!
//! Pure domain types for the storage domain manifest. Nothing in here touches
//! storage; the manifests in `crate::manifest` feed it data read through the
//! outbound ports.
//!
//! ## Modules
//!
//! - `identity` - Domain, image and volume identifiers
//! - `metadata` - Domain metadata map and its persisted line format
//! - `volume_metadata` - Per-volume metadata record
//! - `layout` - On-storage names, tag prefixes and special LVs
//! - `slots` - Metadata slot tags and first-fit selection
//! - `config` - Manifest and lock configuration
//! - `errors` - Error taxonomy

pub mod config;
pub mod errors;
pub mod identity;
pub mod layout;
pub mod metadata;
pub mod slots;
pub mod volume_metadata;
