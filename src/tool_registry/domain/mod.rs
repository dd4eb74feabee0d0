//! Domain model for connector proxies, tools, and persisted records.
//!
//! Covers tool naming, tool metadata, transports derived from manifest
//! endpoints, the proxy connection state machine, and the durable registry
//! record shape. Infrastructure concerns remain outside this boundary.

mod error;
mod ids;
mod proxy_state;
mod record;
mod tool;
mod transport;

pub use error::{ParseConnectionStateError, ToolRegistryDomainError};
pub use ids::ToolName;
pub use proxy_state::{ConnectionState, ConnectorProxyState};
pub use record::RegistryRecord;
pub use tool::ToolDefinition;
pub use transport::{ConnectorTransport, HttpSseTransportConfig, StdioTransportConfig};
