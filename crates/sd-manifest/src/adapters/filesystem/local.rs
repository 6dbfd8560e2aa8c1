use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::domain::errors::BackendError;
use crate::ports::outbound::FileOperations;

/// `FileOperations` over the local (or locally mounted) filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileOperations;

impl LocalFileOperations {
    pub fn new() -> Self {
        Self
    }
}

impl FileOperations for LocalFileOperations {
    fn exists(&self, path: &Path) -> bool {
        // A dangling symlink still occupies the name.
        fs::symlink_metadata(path).is_ok()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        let entries = fs::read_dir(path).map_err(|e| BackendError::io(path, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| BackendError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), BackendError> {
        fs::create_dir_all(path).map_err(|e| BackendError::io(path, e))
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), BackendError> {
        fs::rename(from, to).map_err(|e| BackendError::io(from, e))
    }

    fn remove_file(&self, path: &Path) -> Result<(), BackendError> {
        fs::remove_file(path).map_err(|e| BackendError::io(path, e))
    }

    fn remove_dir(&self, path: &Path) -> Result<(), BackendError> {
        fs::remove_dir(path).map_err(|e| BackendError::io(path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<(), BackendError> {
        fs::remove_dir_all(path).map_err(|e| BackendError::io(path, e))
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        fs::read(path).map_err(|e| BackendError::io(path, e))
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> Result<(), BackendError> {
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| BackendError::io(&temp_path, e))?;
        file.write_all(data)
            .map_err(|e| BackendError::io(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| BackendError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| BackendError::io(path, e))
    }

    fn create_sparse(&self, path: &Path, size: u64) -> Result<(), BackendError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| BackendError::io(path, e))?;
        file.set_len(size).map_err(|e| BackendError::io(path, e))
    }

    fn file_size(&self, path: &Path) -> Result<u64, BackendError> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| BackendError::io(path, e))
    }

    fn allocated_size(&self, path: &Path) -> Result<u64, BackendError> {
        let metadata = fs::metadata(path).map_err(|e| BackendError::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            // st_blocks is always in 512-byte units.
            Ok(metadata.blocks() * 512)
        }

        #[cfg(not(unix))]
        {
            Ok(metadata.len())
        }
    }
}
