//! # Domain Errors
//!
//! Error types for the storage domain manifest.
//!
//! ## Design Principles
//!
//! - Cluster lock failures keep their own type end to end; the manifest never
//!   rewraps a `ClusterLockError` coming out of the lock lifecycle calls
//! - Backend failures surface as-is, no retry inside the manifest
//! - A purge of an image that is already gone is not an error at all

use super::identity::{DomainId, HostId, ImageId, VolumeId};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a `ClusterLock` implementation.
#[derive(Debug, Error)]
pub enum ClusterLockError {
    /// The lock is held by someone else.
    #[error("Cluster lock {resource} already held by host {holder:?}")]
    AlreadyHeld {
        /// Host recorded as holder, when known
        holder: Option<HostId>,
        /// Lock resource (lease path or name)
        resource: String,
    },

    /// Release without a matching acquire.
    #[error("Cluster lock {0} is not held")]
    NotHeld(String),

    /// Acquisition did not complete within the collaborator's timeout.
    #[error("Cluster lock {resource} not acquired within {waited:?}")]
    Timeout {
        /// Lock resource
        resource: String,
        /// Time spent waiting
        waited: Duration,
    },

    /// Lease storage I/O failure.
    #[error("Cluster lock I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other failure of the lock implementation.
    #[error("Cluster lock failure: {0}")]
    Backend(String),
}

/// Failures reported by the storage backends (filesystem, LVM).
#[derive(Debug, Error)]
pub enum BackendError {
    /// Filesystem or device I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Volume group does not exist.
    #[error("Volume group not found: {0}")]
    VgNotFound(String),

    /// Logical volume does not exist.
    #[error("Logical volume not found: {vg}/{lv}")]
    LvNotFound {
        /// Volume group name
        vg: String,
        /// Logical volume name
        lv: String,
    },

    /// Logical volume name already taken.
    #[error("Logical volume already exists: {vg}/{lv}")]
    LvExists {
        /// Volume group name
        vg: String,
        /// Logical volume name
        lv: String,
    },
}

impl BackendError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BackendError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            BackendError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            BackendError::VgNotFound(_) | BackendError::LvNotFound { .. } => true,
            BackendError::LvExists { .. } => false,
        }
    }
}

/// Errors returned by manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Requested metadata key is absent. Callers pick their own fallback.
    #[error("Metadata key not found: {0}")]
    MetadataKeyNotFound(String),

    /// Metadata could not be parsed or holds a value of the wrong kind.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Persisted metadata does not match its checksum line.
    #[error("Metadata checksum mismatch: stored {stored}, computed {computed}")]
    MetadataChecksumMismatch {
        /// Checksum found in storage
        stored: String,
        /// Checksum of the lines read
        computed: String,
    },

    /// Operation addressed a different domain than this manifest.
    #[error("Domain mismatch: manifest is {expected}, request for {got}")]
    DomainMismatch {
        /// This manifest's domain
        expected: DomainId,
        /// Domain named by the caller
        got: DomainId,
    },

    /// Volume does not exist in this domain.
    #[error("Volume not found: {image}/{volume}")]
    VolumeNotFound {
        /// Owning image
        image: ImageId,
        /// Missing volume
        volume: VolumeId,
    },

    /// Volume metadata record is malformed.
    #[error("Invalid volume metadata for {volume}: {reason}")]
    InvalidVolumeMetadata {
        /// Volume the record belongs to
        volume: VolumeId,
        /// What is wrong with it
        reason: String,
    },

    /// Requested volume capacity does not fit in whole sectors.
    #[error("Volume capacity of {0} bytes is out of range")]
    InvalidCapacity(u64),

    /// Volume LV carries no metadata slot tag.
    #[error("No metadata slot recorded for volume {0}")]
    MetadataSlotNotFound(VolumeId),

    /// Storage backend failure.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Cluster lock failure inside a manifest operation.
    #[error(transparent)]
    ClusterLock(#[from] ClusterLockError),
}

/// Result alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
