//! Connector host port: connect, list tools, forward calls.

use crate::manifest::domain::{ConnectorDescriptor, ConnectorId};
use crate::tool_registry::domain::{ToolDefinition, ToolRegistryDomainError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result type for connector host operations.
pub type ConnectorHostResult<T> = Result<T, ConnectorError>;

/// Runtime contract for talking to one connector.
///
/// Implementations share one connection pool across all connectors and must
/// not hold per-connector state that outlives [`ConnectorHost::disconnect`].
#[async_trait]
pub trait ConnectorHost: Send + Sync {
    /// Establishes a session with the connector.
    async fn connect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()>;

    /// Releases the session with the connector.
    async fn disconnect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()>;

    /// Lists tools exposed by a connected connector.
    async fn list_tools(
        &self,
        connector: &ConnectorDescriptor,
    ) -> ConnectorHostResult<Vec<ToolDefinition>>;

    /// Forwards one tool call and returns the connector's result payload.
    async fn call_tool(
        &self,
        connector: &ConnectorDescriptor,
        tool_name: &str,
        arguments: Value,
    ) -> ConnectorHostResult<Value>;
}

/// Per-connector failures. Never fatal to a sync pass.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// The connector could not be reached or answered with an error.
    #[error("connector transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    /// The endpoint transport is not supported by the host adapter.
    #[error("unsupported transport for connector {connector_id}: {reason}")]
    UnsupportedTransport {
        /// Connector identifier.
        connector_id: ConnectorId,
        /// Reason string.
        reason: String,
    },

    /// The operation did not finish within the configured timeout.
    #[error("connector {connector_id} timed out after {timeout_ms}ms")]
    Timeout {
        /// Connector identifier.
        connector_id: ConnectorId,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The connector is not in a state that accepts calls.
    #[error("connector {0} is not connected")]
    NotConnected(ConnectorId),

    /// The proxy has been closed and must not be reused.
    #[error("connector {0} proxy is closed")]
    Closed(ConnectorId),

    /// The connector returned a tool listing that could not be decoded.
    #[error("invalid tool list from connector: {0}")]
    InvalidToolList(String),

    /// The requested state transition is not allowed.
    #[error(transparent)]
    InvalidTransition(#[from] ToolRegistryDomainError),
}

impl ConnectorError {
    /// Wraps a transport-layer failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
