//! Cross-module flows against real scratch directories.

pub mod block_domain;
pub mod file_domain;
