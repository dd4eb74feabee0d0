//! Error types for manifest fetching, parsing, and verification.

use std::sync::Arc;
use thiserror::Error;

/// Errors returned while validating manifest domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestDomainError {
    /// The connector identifier is empty after trimming.
    #[error("connector id must not be empty")]
    EmptyConnectorId,

    /// The connector identifier contains characters outside `[A-Za-z0-9_.-]`.
    #[error(
        "connector id '{0}' contains invalid characters (only alphanumeric, '_', '.' and '-' allowed)"
    )]
    InvalidConnectorId(String),

    /// The connector identifier exceeds the 100-character limit.
    #[error("connector id exceeds 100 character limit: {0}")]
    ConnectorIdTooLong(String),

    /// Two connectors in one manifest share an identifier.
    #[error("duplicate connector id in manifest: {0}")]
    DuplicateConnectorId(String),

    /// `generatedAt + ttlSeconds` does not fit in a millisecond timestamp.
    #[error("manifest expiry overflows: ttl of {ttl_seconds}s")]
    ExpiryOverflow {
        /// Declared time-to-live in seconds.
        ttl_seconds: u64,
    },
}

/// Integrity failures raised while verifying a manifest signature.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// The manifest carried no `signature` member.
    #[error("manifest signature is missing")]
    Missing,

    /// The `signature` member is not a base64 string.
    #[error("manifest signature is not valid base64: {0}")]
    MalformedEncoding(String),

    /// The signature does not match the canonical manifest body.
    #[error("manifest signature does not match payload")]
    Mismatch,

    /// The verification key cannot be used with the configured algorithm.
    #[error("manifest signature key rejected: {0}")]
    InvalidKey(String),
}

/// Failure to obtain a usable manifest from the source.
///
/// All variants are recoverable: the caller falls back to the cached value.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The HTTP request could not be completed.
    #[error("manifest fetch failed: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),

    /// The manifest endpoint answered with a non-success status code.
    #[error("manifest endpoint returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The fetch did not complete within the configured timeout.
    #[error("manifest fetch timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The manifest body is not a well-formed manifest document.
    #[error("manifest parse error: {0}")]
    Parse(String),

    /// The manifest failed integrity verification.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl LoadError {
    /// Wraps a transport-layer failure.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }

    /// Returns whether this failure indicates a possible tampering attempt.
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Signature(_))
    }
}

impl From<ManifestDomainError> for LoadError {
    fn from(err: ManifestDomainError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
