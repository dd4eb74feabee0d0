//! Tool definition value object reported by a connector.

use super::{ToolName, ToolRegistryDomainError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata for a tool exposed by a connector.
///
/// `name` is the connector's own spelling and is what calls are forwarded
/// with; [`ToolDefinition::registry_name`] gives the registry-wide key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "empty_object_schema")]
    input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_schema: Option<Value>,
}

fn empty_object_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

impl ToolDefinition {
    /// Creates a tool definition.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] when the name is
    /// empty after trimming.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: description.into().trim().to_owned(),
            input_schema,
            output_schema: None,
        })
    }

    /// Sets an optional output schema.
    #[must_use]
    pub fn with_output_schema(mut self, output_schema: Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }

    /// Returns the tool name as reported by the connector.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the normalised registry name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the name cannot be
    /// normalised.
    pub fn registry_name(&self) -> Result<ToolName, ToolRegistryDomainError> {
        ToolName::normalize(&self.name)
    }

    /// Returns the tool description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the input schema.
    #[must_use]
    pub const fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Returns the optional output schema.
    #[must_use]
    pub const fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }
}
