//! # Configuration
//!
//! Tunables of the manifest and of the flock-based cluster lock. All values
//! have defaults matching what a freshly created domain uses.

use std::time::Duration;

/// Manifest configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestConfig {
    /// Logical block size when the domain metadata does not set `LOGBLKSIZE`.
    pub default_logical_block_size: u64,

    /// Physical block size when the domain metadata does not set `PHYBLKSIZE`.
    pub default_physical_block_size: u64,

    /// Metadata slots owned by the domain itself (default: 4, slots `0..3`).
    pub reserved_metadata_slots: u64,

    /// Slots occupied by one volume metadata record (default: 1).
    pub volume_metadata_slot_blocks: u64,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            default_logical_block_size: 512,
            default_physical_block_size: 512,
            reserved_metadata_slots: 4,
            volume_metadata_slot_blocks: 1,
        }
    }
}

impl ManifestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default block sizes.
    pub fn with_default_block_sizes(mut self, logical: u64, physical: u64) -> Self {
        self.default_logical_block_size = logical;
        self.default_physical_block_size = physical;
        self
    }

    /// Set the number of reserved metadata slots.
    pub fn with_reserved_metadata_slots(mut self, slots: u64) -> Self {
        self.reserved_metadata_slots = slots;
        self
    }

    /// Set the slot count of a volume metadata record.
    pub fn with_volume_metadata_slot_blocks(mut self, blocks: u64) -> Self {
        self.volume_metadata_slot_blocks = blocks.max(1);
        self
    }
}

/// Configuration of `FlockClusterLock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlockLockConfig {
    /// Give up acquiring after this long (default: 30s).
    pub acquire_timeout: Duration,

    /// First retry delay (default: 50ms), doubled on each retry.
    pub initial_retry_delay: Duration,

    /// Retry delay cap (default: 500ms).
    pub max_retry_delay: Duration,
}

impl Default for FlockLockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(30),
            initial_retry_delay: Duration::from_millis(50),
            max_retry_delay: Duration::from_millis(500),
        }
    }
}

impl FlockLockConfig {
    /// Set the acquisition timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the retry delays.
    pub fn with_retry_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_retry_delay = initial;
        self.max_retry_delay = max.max(initial);
        self
    }
}
