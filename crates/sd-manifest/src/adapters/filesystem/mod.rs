//! # Filesystem Adapters
//!
//! Implementations of the `FileOperations` port.

mod local;

pub use local::LocalFileOperations;
