//! Error types for tool registry domain validation and parsing.

use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The tool name is empty after normalisation.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// The normalised tool name exceeds the 128-character limit.
    #[error("tool name exceeds 128 character limit: {0}")]
    ToolNameTooLong(String),

    /// The connector endpoint URL is empty.
    #[error("connector endpoint URL must not be empty")]
    EmptyEndpointUrl,

    /// The endpoint uses a scheme other than `http`, `https`, or `stdio`.
    #[error("connector endpoint '{0}' must start with 'http://', 'https://' or 'stdio:'")]
    UnsupportedEndpointScheme(String),

    /// A `stdio:` endpoint names no command.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// Transitioning between two connection states is invalid.
    #[error("invalid connector state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current connection state.
        from: String,
        /// Requested target connection state.
        to: String,
    },
}

/// Error returned while parsing a connection state from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown connector connection state: {0}")]
pub struct ParseConnectionStateError(pub String);
