//! # Adapters Module
//!
//! Implementations of the outbound ports.
//!
//! ## Modules
//!
//! - `lock`: Cluster locks (flock over the domain lease file, in-memory)
//! - `filesystem`: Local filesystem for file domains
//! - `lvm`: In-memory LVM for block domains without real volume groups

pub mod filesystem;
pub mod lock;
pub mod lvm;

pub use filesystem::LocalFileOperations;
#[cfg(feature = "locking")]
pub use lock::FlockClusterLock;
pub use lock::InMemoryClusterLock;
pub use lvm::{FakeLvm, DEFAULT_EXTENT_SIZE};
