//! Test doubles and fixture domains shared by the unit tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::adapters::{FakeLvm, LocalFileOperations, DEFAULT_EXTENT_SIZE};
use crate::domain::config::ManifestConfig;
use crate::domain::errors::ClusterLockError;
use crate::domain::identity::{DomainId, HostId};
use crate::manifest::block::{BlockManifest, BlockManifestDependencies};
use crate::manifest::file::{FileManifest, FileManifestDependencies};
use crate::ports::outbound::ClusterLock;

pub const MB: u64 = 1024 * 1024;

/// Larger than the smallest block volume (one 128 MiB extent).
pub const VOLSIZE: u64 = 256 * MB;

/// Format version of fixture domains.
pub const FIXTURE_VERSION: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCall {
    Initialize,
    Acquire(HostId),
    Release,
}

/// Cluster lock recording every call, with optional injected init failure.
#[derive(Default)]
pub struct RecordingClusterLock {
    calls: Mutex<Vec<LockCall>>,
    holder: Mutex<Option<HostId>>,
    init_failure: Option<String>,
}

impl RecordingClusterLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lock whose `initialize` fails with `ClusterLockError::Backend(message)`.
    pub fn failing_init(message: &str) -> Self {
        Self {
            init_failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<LockCall> {
        self.calls.lock().clone()
    }
}

impl ClusterLock for RecordingClusterLock {
    fn initialize(&self) -> Result<(), ClusterLockError> {
        self.calls.lock().push(LockCall::Initialize);
        match &self.init_failure {
            Some(message) => Err(ClusterLockError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    fn acquire(&self, host_id: HostId) -> Result<(), ClusterLockError> {
        self.calls.lock().push(LockCall::Acquire(host_id));
        *self.holder.lock() = Some(host_id);
        Ok(())
    }

    fn release(&self) -> Result<(), ClusterLockError> {
        self.calls.lock().push(LockCall::Release);
        *self.holder.lock() = None;
        Ok(())
    }

    fn inquire(&self) -> Option<HostId> {
        *self.holder.lock()
    }
}

pub struct FileEnv {
    pub _dir: TempDir,
    pub lock: Arc<RecordingClusterLock>,
    pub manifest: FileManifest,
}

pub struct BlockEnv {
    pub _dir: TempDir,
    pub lvm: Arc<FakeLvm>,
    pub lock: Arc<RecordingClusterLock>,
    pub manifest: BlockManifest,
}

/// A freshly created file domain in a scratch directory.
pub fn fake_file_env() -> FileEnv {
    fake_file_env_with_lock(RecordingClusterLock::new())
}

pub fn fake_file_env_with_lock(lock: RecordingClusterLock) -> FileEnv {
    let dir = tempfile::tempdir().unwrap();
    let lock = Arc::new(lock);
    let sd_uuid = DomainId::random();
    let deps = FileManifestDependencies {
        file_ops: Arc::new(LocalFileOperations::new()),
        cluster_lock: lock.clone(),
    };
    let manifest = FileManifest::create(
        dir.path().join(sd_uuid.to_string()),
        sd_uuid,
        FIXTURE_VERSION,
        deps,
        ManifestConfig::default(),
    )
    .unwrap();

    FileEnv {
        _dir: dir,
        lock,
        manifest,
    }
}

/// A freshly created block domain on a fake VG named after the domain.
pub fn fake_block_env() -> BlockEnv {
    fake_block_env_with_lock(RecordingClusterLock::new())
}

pub fn fake_block_env_with_lock(lock: RecordingClusterLock) -> BlockEnv {
    let dir = tempfile::tempdir().unwrap();
    let lvm = Arc::new(FakeLvm::new(dir.path().join("dev")));
    let lock = Arc::new(lock);
    let sd_uuid = DomainId::random();
    lvm.create_vg(&sd_uuid.to_string(), DEFAULT_EXTENT_SIZE);

    let manifest = BlockManifest::create(
        sd_uuid,
        FIXTURE_VERSION,
        block_deps(&lvm, &lock),
        ManifestConfig::default(),
    )
    .unwrap();

    BlockEnv {
        _dir: dir,
        lvm,
        lock,
        manifest,
    }
}

pub fn block_deps(
    lvm: &Arc<FakeLvm>,
    lock: &Arc<RecordingClusterLock>,
) -> BlockManifestDependencies {
    BlockManifestDependencies {
        lvm: lvm.clone(),
        cluster_lock: lock.clone(),
    }
}
