//! Shared test helpers for in-memory integration tests.

use chrono::DateTime;
use eyre::{WrapErr, eyre};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchyard::manifest::{
    adapters::ScriptedManifestSource,
    domain::{ConnectorDescriptor, ConnectorId, LoadedManifest, ManifestPayload},
    services::ManifestCache,
};
use switchyard::sync::{SyncCoordinator, SyncDependencies, SyncSettings};
use switchyard::test_support::ManualClock;
use switchyard::tool_registry::{
    adapters::{InMemoryConnectorHost, memory::InMemoryRegistryStore},
    domain::ToolDefinition,
    services::{RegistryPersistence, ToolRegistry},
};

/// 2026-01-01T00:00:00Z in epoch milliseconds.
pub const START_MS: i64 = 1_767_225_600_000;

/// Coordinator type used throughout the in-memory tests.
pub type TestCoordinator =
    SyncCoordinator<ScriptedManifestSource, InMemoryConnectorHost, ManualClock>;

/// Everything a sync test needs to script and observe a pass.
pub struct SyncHarness {
    /// Clock shared by the cache and proxies.
    pub clock: Arc<ManualClock>,
    /// Scripted manifest source.
    pub source: Arc<ScriptedManifestSource>,
    /// In-memory connector host.
    pub host: Arc<InMemoryConnectorHost>,
    /// Snapshot store behind persistence.
    pub store: Arc<InMemoryRegistryStore>,
    /// Debounced registry persistence.
    pub persistence: Arc<RegistryPersistence>,
    /// Coordinator under test.
    pub coordinator: TestCoordinator,
}

impl SyncHarness {
    /// Builds a harness with an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if persistence cannot open.
    pub async fn new(settings: SyncSettings) -> eyre::Result<Self> {
        let clock = Arc::new(ManualClock::at_millis(START_MS));
        let source = Arc::new(ScriptedManifestSource::new());
        let host = Arc::new(InMemoryConnectorHost::new());
        let store = Arc::new(InMemoryRegistryStore::new());
        let persistence = Arc::new(
            RegistryPersistence::open(Arc::clone(&store), Duration::from_secs(3600))
                .await
                .wrap_err("persistence should open")?,
        );
        let coordinator = SyncCoordinator::new(
            SyncDependencies {
                source: Arc::clone(&source),
                cache: Arc::new(ManifestCache::new(Arc::clone(&clock))),
                host: Arc::clone(&host),
                clock: Arc::clone(&clock),
                registry: Arc::new(ToolRegistry::new()),
                persistence: Arc::clone(&persistence),
            },
            settings,
        );
        Ok(Self {
            clock,
            source,
            host,
            store,
            persistence,
            coordinator,
        })
    }

    /// Serves a manifest generated now with a one-minute TTL on every load.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid connector ids.
    pub fn serve(&self, connectors: &[(&str, bool)]) -> eyre::Result<()> {
        let manifest = manifest(self.clock.now_ms(), 60, connectors)?;
        self.source.set_fallback(Ok(manifest));
        Ok(())
    }

    /// Gives `connector` a catalogue of tools with the given names.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid ids or tool names.
    pub fn catalog(&self, connector: &str, tool_names: &[&str]) -> eyre::Result<()> {
        let tools = tool_names
            .iter()
            .map(|name| tool(name))
            .collect::<eyre::Result<Vec<_>>>()?;
        self.host
            .set_tool_catalog(connector_id(connector)?, tools)
            .wrap_err("catalogue should be set")
    }
}

/// Parses a connector id.
///
/// # Errors
///
/// Returns an error for invalid ids.
pub fn connector_id(id: &str) -> eyre::Result<ConnectorId> {
    ConnectorId::new(id).map_err(|err| eyre!("invalid connector id '{id}': {err}"))
}

/// Builds a descriptor at `https://<id>.example/mcp`.
///
/// # Errors
///
/// Returns an error for invalid ids.
pub fn descriptor(id: &str, enabled: bool) -> eyre::Result<ConnectorDescriptor> {
    Ok(
        ConnectorDescriptor::new(connector_id(id)?, format!("https://{id}.example/mcp"))
            .with_enabled(enabled),
    )
}

/// Builds a verified manifest.
///
/// # Errors
///
/// Returns an error for invalid ids or an unrepresentable expiry.
pub fn manifest(
    generated_at_ms: i64,
    ttl_seconds: u64,
    connectors: &[(&str, bool)],
) -> eyre::Result<LoadedManifest> {
    let generated_at = DateTime::from_timestamp_millis(generated_at_ms)
        .ok_or_else(|| eyre!("timestamp out of range"))?;
    let descriptors = connectors
        .iter()
        .map(|(id, enabled)| descriptor(id, *enabled))
        .collect::<eyre::Result<Vec<_>>>()?;
    let payload = ManifestPayload::new(generated_at, ttl_seconds, descriptors, Vec::new())?;
    Ok(LoadedManifest::from_payload(payload)?)
}

/// Builds a tool with an empty object schema.
///
/// # Errors
///
/// Returns an error for an empty name.
pub fn tool(name: &str) -> eyre::Result<ToolDefinition> {
    Ok(ToolDefinition::new(
        name,
        format!("Tool {name}"),
        json!({"type": "object"}),
    )?)
}
