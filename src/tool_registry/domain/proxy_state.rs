//! Connector proxy connection state machine.

use super::{ParseConnectionStateError, ToolRegistryDomainError};
use crate::manifest::domain::ConnectorId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of a connector proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Proxy exists but has never connected.
    Disconnected,
    /// A connection attempt is in progress.
    Connecting,
    /// The connector is reachable and its tools are known.
    Connected,
    /// The last connection attempt or call failed.
    Degraded,
    /// The proxy has been shut down and must be discarded.
    Closed,
}

impl ConnectionState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Degraded => "degraded",
            Self::Closed => "closed",
        }
    }

    /// Returns whether tool calls may be forwarded in this state.
    #[must_use]
    pub const fn can_call_tools(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns whether transition to `target` is allowed.
    ///
    /// `Closed` is terminal.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Disconnected | Self::Degraded,
                Self::Connecting | Self::Closed
            ) | (
                Self::Connecting,
                Self::Connected | Self::Degraded | Self::Closed
            ) | (
                Self::Connected,
                Self::Connecting | Self::Degraded | Self::Closed
            )
        )
    }

    /// Validates a transition to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStateTransition`] when the
    /// transition is not allowed.
    pub fn transition_to(self, target: Self) -> Result<Self, ToolRegistryDomainError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ToolRegistryDomainError::InvalidStateTransition {
                from: self.as_str().to_owned(),
                to: target.as_str().to_owned(),
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConnectionState {
    type Error = ParseConnectionStateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "degraded" => Ok(Self::Degraded),
            "closed" => Ok(Self::Closed),
            _ => Err(ParseConnectionStateError(value.to_owned())),
        }
    }
}

/// Point-in-time view of a connector proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorProxyState {
    /// Connector identifier.
    pub id: ConnectorId,
    /// Current connection state.
    pub state: ConnectionState,
    /// Tool names reported by the connector on its last successful connect.
    pub tool_names: Vec<String>,
    /// Message from the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// When the current connection was established, in epoch milliseconds.
    pub connected_at_ms: Option<i64>,
    /// Failures since the last successful connect.
    pub consecutive_failures: u32,
    /// When the proxy first became degraded, in epoch milliseconds.
    pub degraded_since_ms: Option<i64>,
}

impl ConnectorProxyState {
    /// Creates the initial state for a new proxy.
    #[must_use]
    pub const fn disconnected(id: ConnectorId) -> Self {
        Self {
            id,
            state: ConnectionState::Disconnected,
            tool_names: Vec::new(),
            last_error: None,
            connected_at_ms: None,
            consecutive_failures: 0,
            degraded_since_ms: None,
        }
    }
}
