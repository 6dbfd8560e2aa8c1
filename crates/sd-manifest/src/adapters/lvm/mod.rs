//! # LVM Adapters
//!
//! `FakeLvm` keeps volume groups in memory and backs active LVs with sparse
//! files, so block domains run without real devices.

mod fake;

pub use fake::{FakeLvm, DEFAULT_EXTENT_SIZE};
