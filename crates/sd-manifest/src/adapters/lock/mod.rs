//! # Cluster Locks
//!
//! ## Modules
//!
//! - `flock`: Lease-file lock using fs2 (feature `locking`)
//! - `memory`: Process-local lock for single-host setups

#[cfg(feature = "locking")]
mod flock;
mod memory;

#[cfg(feature = "locking")]
pub use flock::FlockClusterLock;
pub use memory::InMemoryClusterLock;
