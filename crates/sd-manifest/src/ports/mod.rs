//! # Ports Layer
//!
//! Defines the port traits of the storage domain manifest.
//!
//! ## Hexagonal Architecture
//!
//! - `inbound.rs` - Driving ports (the manifest contract used by the pool manager)
//! - `outbound.rs` - Driven ports (cluster lock and storage backends)

pub mod inbound;
pub mod outbound;
