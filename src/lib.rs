//! Switchyard: connector synchronisation and tool proxy registry.
//!
//! The crate keeps a live set of remote tool-serving connectors in step with
//! a signed manifest. Each pass verifies and caches the manifest, brings
//! enabled connectors up behind proxies, republishes their tools in one
//! registry, and records every known connector in a durable file.
//!
//! # Architecture
//!
//! Each context follows hexagonal architecture principles:
//!
//! - **Domain**: Pure value types and state machines
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (HTTP, files, memory)
//! - **Services**: Orchestration over ports
//!
//! # Modules
//!
//! - [`manifest`]: Manifest verification, loading, and caching
//! - [`tool_registry`]: Connector proxies, the tool registry, and persistence
//! - [`sync`]: Pass coordination and the refresh scheduler
//! - [`config`]: Environment configuration
//! - [`telemetry`]: Logging setup

pub mod config;
pub mod manifest;
pub mod sync;
pub mod telemetry;
pub mod tool_registry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
