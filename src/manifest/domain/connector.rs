//! Connector identity and descriptor value objects.

use super::ManifestDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a connector identifier.
const MAX_CONNECTOR_ID_LENGTH: usize = 100;

/// Validated connector identifier, unique within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Creates a validated connector identifier.
    ///
    /// The input is trimmed. Only characters in `[A-Za-z0-9_.-]` are
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestDomainError`] when validation fails.
    pub fn new(value: impl Into<String>) -> Result<Self, ManifestDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(ManifestDomainError::EmptyConnectorId);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '_' | '.' | '-')
        });
        if !is_valid {
            return Err(ManifestDomainError::InvalidConnectorId(normalized));
        }

        if normalized.len() > MAX_CONNECTOR_ID_LENGTH {
            return Err(ManifestDomainError::ConnectorIdTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConnectorId {
    type Error = ManifestDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConnectorId> for String {
    fn from(value: ConnectorId) -> Self {
        value.0
    }
}

impl AsRef<str> for ConnectorId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A remote tool-serving endpoint as described by the manifest.
///
/// Owned by the manifest and never mutated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorDescriptor {
    id: ConnectorId,
    enabled: bool,
    endpoint_url: String,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

impl ConnectorDescriptor {
    /// Creates an enabled descriptor with no scopes or tags.
    #[must_use]
    pub fn new(id: ConnectorId, endpoint_url: impl Into<String>) -> Self {
        Self {
            id,
            enabled: true,
            endpoint_url: endpoint_url.into().trim().to_owned(),
            scopes: Vec::new(),
            tags: Vec::new(),
            version: None,
        }
    }

    /// Sets whether the connector is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the granted scopes.
    #[must_use]
    pub fn with_scopes(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.scopes = values.into_iter().collect();
        self
    }

    /// Replaces the descriptive tags.
    #[must_use]
    pub fn with_tags(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.tags = values.into_iter().collect();
        self
    }

    /// Sets the advertised connector version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Returns the connector identifier.
    #[must_use]
    pub const fn id(&self) -> &ConnectorId {
        &self.id
    }

    /// Returns whether the connector should be connected.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    /// Returns the granted scopes.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns the descriptive tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the advertised connector version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Returns whether `other` can reuse a connection made for `self`.
    ///
    /// Only the endpoint and scopes affect the live connection; tags and
    /// version are informational.
    #[must_use]
    pub fn same_connection(&self, other: &Self) -> bool {
        self.endpoint_url == other.endpoint_url && self.scopes == other.scopes
    }
}
