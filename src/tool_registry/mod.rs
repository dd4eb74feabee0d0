//! Live connector proxies, the tool registry, and registry persistence.
//!
//! Each enabled connector gets one [`services::ConnectorProxy`] that owns its
//! connection state machine. Tools reported by connected proxies are routed
//! through [`services::ToolRegistry`], and every connector ever seen is kept
//! as a [`domain::RegistryRecord`] by [`services::RegistryPersistence`]. The
//! module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
