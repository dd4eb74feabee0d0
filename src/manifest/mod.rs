//! Signed connector manifest: fetching, verification, and caching.
//!
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The stale-on-error cache in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
