//! Application services for connector proxies, tool routing, and persistence.

mod persistence;
mod proxy;
mod registry;

pub use persistence::{DEFAULT_FLUSH_INTERVAL, RegistryPersistence};
pub use proxy::{ConnectorProxy, EnsureOutcome, ProxyToolHandler};
pub use registry::{
    RegistrationOutcome, ToolCallError, ToolHandler, ToolRegistry, ToolRegistryEntry,
};
