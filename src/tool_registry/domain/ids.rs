//! Normalised tool name type.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a normalised tool name.
const MAX_TOOL_NAME_LENGTH: usize = 128;

/// Registry-wide tool name.
///
/// Names are trimmed and lowercased, and every character outside
/// `[a-z0-9_.]` becomes `_`, so `"Create Issue"` and `"create-issue"` both
/// resolve to `create_issue`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolName(String);

impl ToolName {
    /// Normalises a raw tool name reported by a connector.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the name is empty or too long
    /// after normalisation.
    pub fn normalize(value: &str) -> Result<Self, ToolRegistryDomainError> {
        let normalized: String = value
            .trim()
            .chars()
            .map(|character| {
                let lower = character.to_ascii_lowercase();
                if lower.is_ascii_lowercase() || lower.is_ascii_digit() || matches!(lower, '_' | '.')
                {
                    lower
                } else {
                    '_'
                }
            })
            .collect();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        if normalized.chars().count() > MAX_TOOL_NAME_LENGTH {
            return Err(ToolRegistryDomainError::ToolNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalised name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
