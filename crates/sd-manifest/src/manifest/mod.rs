//! # Manifests
//!
//! - `core` - Identity, metadata cache and cluster lock, composed into both variants
//! - `domain_lock` - Scoped domain lock acquisition
//! - `file` - File domain manifest (directory tree)
//! - `block` - Block domain manifest (LVs in a VG) and its metadata slot allocator

pub mod block;
pub mod core;
pub mod domain_lock;
pub mod file;
