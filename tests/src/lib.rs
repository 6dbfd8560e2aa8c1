//! # Storage Domain Manifest Test Suite
//!
//! Unified test crate for flows that span several modules of `sd-manifest`.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── file_domain.rs    # File domain lifecycle, flock between hosts
//!     └── block_domain.rs   # Block domain lifecycle, concurrent slot allocation
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sd-tests
//!
//! # With manifest logs
//! RUST_LOG=sd_manifest=debug cargo test -p sd-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sd_manifest=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
