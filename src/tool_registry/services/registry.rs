//! Process-wide tool registry.
//!
//! Maps normalised tool names to the connector that owns them and a handler
//! that forwards calls to that connector's proxy. Each name resolves to
//! exactly one connector at any instant: when two connectors report the same
//! name, the first registration wins and later ones are logged and skipped.

use crate::manifest::domain::ConnectorId;
use crate::tool_registry::{
    domain::{ToolDefinition, ToolName, ToolRegistryDomainError},
    ports::ConnectorError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Forwards a call for one registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with `arguments`.
    async fn call(&self, arguments: Value) -> Result<Value, ConnectorError>;
}

/// One registered tool.
#[derive(Clone)]
pub struct ToolRegistryEntry {
    name: ToolName,
    connector_id: ConnectorId,
    description: String,
    input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl fmt::Debug for ToolRegistryEntry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ToolRegistryEntry")
            .field("name", &self.name)
            .field("connector_id", &self.connector_id)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl ToolRegistryEntry {
    /// Builds an entry for `definition` owned by `connector_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the tool name cannot be
    /// normalised.
    pub fn new(
        connector_id: ConnectorId,
        definition: &ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self {
            name: definition.registry_name()?,
            connector_id,
            description: definition.description().to_owned(),
            input_schema: definition.input_schema().clone(),
            handler,
        })
    }

    /// Returns the normalised name.
    #[must_use]
    pub const fn name(&self) -> &ToolName {
        &self.name
    }

    /// Returns the owning connector.
    #[must_use]
    pub const fn connector_id(&self) -> &ConnectorId {
        &self.connector_id
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

    /// Invokes the handler.
    ///
    /// # Errors
    ///
    /// Returns the handler's [`ConnectorError`].
    pub async fn call(&self, arguments: Value) -> Result<Value, ConnectorError> {
        self.handler.call(arguments).await
    }
}

/// Result of registering one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The name was free.
    Inserted,
    /// The same connector re-registered its own tool.
    Replaced,
    /// Another connector already owns the name.
    Rejected {
        /// Connector that owns the name.
        owner: ConnectorId,
    },
}

/// Errors returned by [`ToolRegistry::call`].
#[derive(Debug, Clone, Error)]
pub enum ToolCallError {
    /// No tool is registered under the name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The owning connector failed the call.
    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Thread-safe registry of live tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: RwLock<HashMap<ToolName, ToolRegistryEntry>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` unless another connector owns its name.
    #[must_use = "rejected registrations should be reported"]
    pub fn register_tool(&self, entry: ToolRegistryEntry) -> RegistrationOutcome {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Self::insert(&mut entries, entry)
    }

    fn insert(
        entries: &mut HashMap<ToolName, ToolRegistryEntry>,
        entry: ToolRegistryEntry,
    ) -> RegistrationOutcome {
        match entries.get(&entry.name) {
            Some(existing) if existing.connector_id != entry.connector_id => {
                warn!(
                    tool = %entry.name,
                    owner = %existing.connector_id,
                    rejected = %entry.connector_id,
                    "tool name already registered by another connector, skipping"
                );
                RegistrationOutcome::Rejected {
                    owner: existing.connector_id.clone(),
                }
            }
            Some(_) => {
                entries.insert(entry.name.clone(), entry);
                RegistrationOutcome::Replaced
            }
            None => {
                debug!(tool = %entry.name, connector_id = %entry.connector_id, "registered tool");
                entries.insert(entry.name.clone(), entry);
                RegistrationOutcome::Inserted
            }
        }
    }

    /// Replaces every tool owned by `connector_id` with `entries` in one step.
    ///
    /// Readers never observe the connector with a partial tool set. Entries
    /// owned by other connectors are subject to the usual collision rule.
    #[must_use = "rejected registrations should be reported"]
    pub fn replace_tools_for_connector(
        &self,
        connector_id: &ConnectorId,
        replacements: Vec<ToolRegistryEntry>,
    ) -> Vec<RegistrationOutcome> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, entry| entry.connector_id != *connector_id);
        replacements
            .into_iter()
            .map(|entry| Self::insert(&mut entries, entry))
            .collect()
    }

    /// Removes every tool owned by `connector_id` and returns how many.
    pub fn unregister_tools_for_connector(&self, connector_id: &ConnectorId) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.connector_id != *connector_id);
        before - entries.len()
    }

    /// Resolves a tool by name. The name is normalised before lookup.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<ToolRegistryEntry> {
        let normalized = ToolName::normalize(name).ok()?;
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&normalized)
            .cloned()
    }

    /// Resolves `name` and forwards the call to its owning connector.
    ///
    /// # Errors
    ///
    /// Returns [`ToolCallError::UnknownTool`] for unregistered names and
    /// [`ToolCallError::Connector`] when the connector fails the call.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolCallError> {
        let entry = self
            .resolve(name)
            .ok_or_else(|| ToolCallError::UnknownTool(name.to_owned()))?;
        Ok(entry.call(arguments).await?)
    }

    /// Returns every entry sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<ToolRegistryEntry> {
        let mut listed: Vec<ToolRegistryEntry> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        listed.sort_by(|left, right| left.name.cmp(&right.name));
        listed
    }

    /// Returns the names owned by `connector_id`, sorted.
    #[must_use]
    pub fn tools_for_connector(&self, connector_id: &ConnectorId) -> Vec<ToolName> {
        let mut names: Vec<ToolName> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| entry.connector_id == *connector_id)
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
