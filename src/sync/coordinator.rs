//! One synchronisation pass from manifest to live tools and records.

use super::records::registry_record;
use super::summary::{ManifestStatus, SyncFailure, SyncSummary};
use crate::manifest::{
    domain::{ConnectorDescriptor, ConnectorId, ManifestPayload},
    ports::ManifestSource,
    services::ManifestCache,
};
use crate::tool_registry::{
    domain::{ConnectorProxyState, ToolDefinition},
    ports::{ConnectorError, ConnectorHost},
    services::{
        ConnectorProxy, EnsureOutcome, ProxyToolHandler, RegistryPersistence, ToolRegistry,
        ToolRegistryEntry,
    },
};
use mockable::Clock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Default bound on concurrent connector setups.
pub const DEFAULT_SYNC_CONCURRENCY: usize = 4;

/// Tuning for synchronisation passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum connector setups in flight at once. Values below one act as one.
    pub concurrency: usize,
    /// Bound on connect plus tool listing for one connector.
    pub connect_timeout: Duration,
    /// Consecutive failures after which a connector is logged at `error`.
    pub failure_threshold: u32,
    /// How long a degraded connector keeps its tools registered.
    pub degraded_grace: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_SYNC_CONCURRENCY,
            connect_timeout: Duration::from_secs(10),
            failure_threshold: 3,
            degraded_grace: Duration::from_secs(60),
        }
    }
}

type Proxy<H, C> = Arc<ConnectorProxy<H, C>>;
type EnsureResult<H, C> = (
    ConnectorDescriptor,
    Proxy<H, C>,
    Result<EnsureOutcome, ConnectorError>,
);

/// Collaborators shared by the coordinator.
pub struct SyncDependencies<S, H, C>
where
    S: ManifestSource,
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    /// Manifest loader.
    pub source: Arc<S>,
    /// Single-slot manifest cache.
    pub cache: Arc<ManifestCache<C>>,
    /// Connector host shared by every proxy.
    pub host: Arc<H>,
    /// Clock shared by proxies.
    pub clock: Arc<C>,
    /// Live tool registry.
    pub registry: Arc<ToolRegistry>,
    /// Durable registry records.
    pub persistence: Arc<RegistryPersistence>,
}

/// Orchestrates synchronisation passes.
///
/// Passes are serialised: a second [`SyncCoordinator::run`] waits for the
/// first to finish. Within a pass, connectors are brought up concurrently
/// under [`SyncSettings::concurrency`] and each one's failure is isolated.
pub struct SyncCoordinator<S, H, C>
where
    S: ManifestSource,
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    source: Arc<S>,
    cache: Arc<ManifestCache<C>>,
    host: Arc<H>,
    clock: Arc<C>,
    registry: Arc<ToolRegistry>,
    persistence: Arc<RegistryPersistence>,
    settings: SyncSettings,
    proxies: Mutex<HashMap<ConnectorId, Proxy<H, C>>>,
    run_gate: Mutex<()>,
}

impl<S, H, C> SyncCoordinator<S, H, C>
where
    S: ManifestSource,
    H: ConnectorHost + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a coordinator with no proxies.
    #[must_use]
    pub fn new(dependencies: SyncDependencies<S, H, C>, settings: SyncSettings) -> Self {
        Self {
            source: dependencies.source,
            cache: dependencies.cache,
            host: dependencies.host,
            clock: dependencies.clock,
            registry: dependencies.registry,
            persistence: dependencies.persistence,
            settings,
            proxies: Mutex::new(HashMap::new()),
            run_gate: Mutex::new(()),
        }
    }

    /// Returns the live tool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Returns the state of every live proxy, ordered by connector id.
    pub async fn proxy_states(&self) -> Vec<ConnectorProxyState> {
        let proxies = self.proxies.lock().await;
        let mut states: Vec<ConnectorProxyState> =
            proxies.values().map(|proxy| proxy.status()).collect();
        states.sort_by(|left, right| left.id.cmp(&right.id));
        states
    }

    /// Runs one pass and returns its summary.
    pub async fn run(&self) -> SyncSummary {
        let _gate = self.run_gate.lock().await;
        let pass_id = Uuid::new_v4();
        self.run_pass()
            .instrument(info_span!("sync_pass", %pass_id))
            .await
    }

    async fn run_pass(&self) -> SyncSummary {
        let Some((manifest, manifest_status)) = self.resolve_manifest().await else {
            warn!("no manifest has been loaded yet, skipping pass");
            return SyncSummary::unavailable();
        };

        let enabled: Vec<ConnectorDescriptor> = manifest.enabled_connectors().cloned().collect();
        let enabled_ids: HashSet<&ConnectorId> =
            enabled.iter().map(ConnectorDescriptor::id).collect();
        self.close_removed(&enabled_ids).await;

        let attempted = enabled.len();
        let mut succeeded = 0;
        let mut failed = Vec::new();
        for (descriptor, proxy, outcome) in self.fan_out(enabled).await {
            match outcome {
                Ok(EnsureOutcome::Connected { tools }) => {
                    self.register_tools(&proxy, &tools);
                    succeeded += 1;
                }
                Ok(EnsureOutcome::Unchanged) => {
                    self.offer_unregistered_tools(&proxy);
                    succeeded += 1;
                }
                Err(err) => failed.push(self.record_failure(&descriptor, &proxy, &err)),
            }
        }
        failed.sort_by(|left, right| left.id.cmp(&right.id));

        self.persist_records(&manifest).await;

        info!(
            manifest = %manifest_status,
            attempted,
            succeeded,
            failed = failed.len(),
            tools = self.registry.len(),
            "sync pass complete"
        );
        SyncSummary {
            attempted,
            succeeded,
            failed,
            manifest: manifest_status,
        }
    }

    async fn resolve_manifest(&self) -> Option<(Arc<ManifestPayload>, ManifestStatus)> {
        if !self.cache.is_stale()
            && let Some(cached) = self.cache.get()
        {
            debug!("cached manifest is fresh, skipping fetch");
            return Some((cached, ManifestStatus::Reused));
        }

        match self.source.load().await {
            Ok(loaded) => {
                info!(
                    connectors = loaded.payload.connectors().len(),
                    expires_at_ms = loaded.expires_at_ms,
                    "loaded connector manifest"
                );
                self.cache.store(loaded);
                self.cache
                    .get()
                    .map(|payload| (payload, ManifestStatus::Refreshed))
            }
            Err(err) => {
                if err.is_integrity_failure() {
                    error!(error = %err, "manifest failed signature verification, serving cached manifest");
                } else {
                    warn!(error = %err, "manifest refresh failed, serving cached manifest");
                }
                self.cache
                    .get()
                    .map(|payload| (payload, ManifestStatus::Stale))
            }
        }
    }

    async fn proxy_for(&self, id: &ConnectorId) -> Proxy<H, C> {
        let mut proxies = self.proxies.lock().await;
        let proxy = proxies.entry(id.clone()).or_insert_with(|| {
            Arc::new(ConnectorProxy::new(
                id.clone(),
                Arc::clone(&self.host),
                Arc::clone(&self.clock),
                self.settings.connect_timeout,
            ))
        });
        Arc::clone(proxy)
    }

    async fn close_removed(&self, enabled_ids: &HashSet<&ConnectorId>) {
        let removed: Vec<Proxy<H, C>> = {
            let mut proxies = self.proxies.lock().await;
            let stale_ids: Vec<ConnectorId> = proxies
                .keys()
                .filter(|id| !enabled_ids.contains(id))
                .cloned()
                .collect();
            stale_ids
                .iter()
                .filter_map(|id| proxies.remove(id))
                .collect()
        };

        for proxy in removed {
            proxy.close().await;
            let withdrawn = self.registry.unregister_tools_for_connector(proxy.id());
            info!(connector_id = %proxy.id(), withdrawn, "closed connector no longer enabled");
        }
    }

    async fn fan_out(&self, enabled: Vec<ConnectorDescriptor>) -> Vec<EnsureResult<H, C>> {
        let limit = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut spawned = HashMap::new();

        for descriptor in enabled {
            let proxy = self.proxy_for(descriptor.id()).await;
            let Ok(permit) = Arc::clone(&limit).acquire_owned().await else {
                error!("connector fan-out limit closed unexpectedly");
                break;
            };
            let task_proxy = Arc::clone(&proxy);
            let task_descriptor = descriptor.clone();
            let handle = tasks.spawn(async move {
                let outcome = task_proxy.ensure(&task_descriptor).await;
                drop(permit);
                (task_descriptor, task_proxy, outcome)
            });
            spawned.insert(handle.id(), (descriptor, proxy));
        }

        let mut results = Vec::with_capacity(spawned.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, result)) => results.push(result),
                Err(join_error) => {
                    if let Some((descriptor, proxy)) = spawned.remove(&join_error.id()) {
                        let err = ConnectorError::transport(std::io::Error::other(format!(
                            "connector task failed: {join_error}"
                        )));
                        results.push((descriptor, proxy, Err(err)));
                    }
                }
            }
        }
        results
    }

    fn register_tools(&self, proxy: &Proxy<H, C>, tools: &[ToolDefinition]) {
        let entries: Vec<ToolRegistryEntry> = tools
            .iter()
            .filter_map(|tool| {
                let handler = Arc::new(ProxyToolHandler::new(Arc::clone(proxy), tool.name()));
                ToolRegistryEntry::new(proxy.id().clone(), tool, handler)
                    .inspect_err(|err| {
                        warn!(
                            connector_id = %proxy.id(),
                            tool = tool.name(),
                            error = %err,
                            "skipping tool with invalid name"
                        );
                    })
                    .ok()
            })
            .collect();

        let outcomes = self
            .registry
            .replace_tools_for_connector(proxy.id(), entries);
        debug!(connector_id = %proxy.id(), registered = outcomes.len(), "registered connector tools");
    }

    /// Re-offers a connected proxy's tools when some of them are missing
    /// from the registry, such as names freed by a removed connector.
    fn offer_unregistered_tools(&self, proxy: &Proxy<H, C>) {
        let tools = proxy.tools();
        if self.registry.tools_for_connector(proxy.id()).len() < tools.len() {
            self.register_tools(proxy, &tools);
        }
    }

    fn record_failure(
        &self,
        descriptor: &ConnectorDescriptor,
        proxy: &Proxy<H, C>,
        err: &ConnectorError,
    ) -> SyncFailure {
        let consecutive_failures = proxy.status().consecutive_failures;
        if consecutive_failures >= self.settings.failure_threshold {
            error!(connector_id = %descriptor.id(), consecutive_failures, error = %err, "connector keeps failing");
        } else {
            warn!(connector_id = %descriptor.id(), consecutive_failures, error = %err, "connector sync failed");
        }

        if proxy.degraded_past_grace(self.settings.degraded_grace) {
            let withdrawn = self.registry.unregister_tools_for_connector(descriptor.id());
            if withdrawn > 0 {
                warn!(connector_id = %descriptor.id(), withdrawn, "degraded past grace period, tools withdrawn");
            }
        }

        SyncFailure {
            id: descriptor.id().clone(),
            error: err.to_string(),
            consecutive_failures,
        }
    }

    async fn persist_records(&self, manifest: &ManifestPayload) {
        let generated_at_ms = manifest.generated_at().timestamp_millis();
        let states: HashMap<ConnectorId, ConnectorProxyState> = self
            .proxy_states()
            .await
            .into_iter()
            .map(|state| (state.id.clone(), state))
            .collect();

        for descriptor in manifest.connectors() {
            let record = registry_record(descriptor, generated_at_ms, states.get(descriptor.id()));
            if let Err(err) = self.persistence.upsert(record).await {
                warn!(connector_id = %descriptor.id(), error = %err, "failed to record connector");
            }
        }
    }

    /// Closes every proxy and withdraws its tools.
    ///
    /// Waits for an in-flight pass to finish first.
    pub async fn shutdown(&self) {
        let _gate = self.run_gate.lock().await;
        let proxies: Vec<Proxy<H, C>> = self
            .proxies
            .lock()
            .await
            .drain()
            .map(|(_, proxy)| proxy)
            .collect();
        for proxy in &proxies {
            proxy.close().await;
            self.registry.unregister_tools_for_connector(proxy.id());
        }
        info!(closed = proxies.len(), "closed all connector proxies");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::domain::{LoadError, LoadedManifest, SignatureError};
    use crate::manifest::ports::MockManifestSource;
    use crate::test_support::{ManualClock, loaded_manifest};
    use crate::tool_registry::adapters::InMemoryConnectorHost;
    use crate::tool_registry::adapters::memory::InMemoryRegistryStore;
    use crate::tool_registry::domain::ConnectionState;
    use mockall::Sequence;
    use serde_json::json;

    type TestCoordinator = SyncCoordinator<MockManifestSource, InMemoryConnectorHost, ManualClock>;

    struct Harness {
        coordinator: TestCoordinator,
        host: Arc<InMemoryConnectorHost>,
        clock: Arc<ManualClock>,
        persistence: Arc<RegistryPersistence>,
    }

    async fn harness(source: MockManifestSource) -> Harness {
        let host = Arc::new(InMemoryConnectorHost::new());
        let clock = Arc::new(ManualClock::at_millis(0));
        let persistence = Arc::new(
            RegistryPersistence::open(
                Arc::new(InMemoryRegistryStore::new()),
                Duration::from_secs(60),
            )
            .await
            .expect("persistence should open"),
        );
        let coordinator = SyncCoordinator::new(
            SyncDependencies {
                source: Arc::new(source),
                cache: Arc::new(ManifestCache::new(Arc::clone(&clock))),
                host: Arc::clone(&host),
                clock: Arc::clone(&clock),
                registry: Arc::new(ToolRegistry::new()),
                persistence: Arc::clone(&persistence),
            },
            SyncSettings {
                degraded_grace: Duration::from_secs(1),
                ..SyncSettings::default()
            },
        );
        Harness {
            coordinator,
            host,
            clock,
            persistence,
        }
    }

    fn manifest() -> LoadedManifest {
        loaded_manifest(0, 300, &[("a", true)])
    }

    fn give_tool(host: &InMemoryConnectorHost, connector: &str, tool: &str) {
        let definition = ToolDefinition::new(tool, "", json!({})).expect("valid tool");
        host.set_tool_catalog(
            ConnectorId::new(connector).expect("valid id"),
            vec![definition],
        )
        .expect("catalogue stored");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_cache_and_failed_load_aborts_the_pass() {
        let mut source = MockManifestSource::new();
        source
            .expect_load()
            .times(1)
            .returning(|| Err(LoadError::Status { status: 503 }));
        let harness = harness(source).await;

        let summary = harness.coordinator.run().await;

        assert_eq!(summary, SyncSummary::unavailable());
        assert!(harness.coordinator.proxy_states().await.is_empty());
        assert!(harness.persistence.read_all().await.expect("read").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_manifest_is_reused_without_fetching() {
        let mut source = MockManifestSource::new();
        source.expect_load().times(1).returning(|| Ok(manifest()));
        let harness = harness(source).await;

        let first = harness.coordinator.run().await;
        let second = harness.coordinator.run().await;

        assert_eq!(first.manifest, ManifestStatus::Refreshed);
        assert_eq!(second.manifest, ManifestStatus::Reused);
        assert_eq!(second.succeeded, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_refresh_serves_the_stale_manifest() {
        let mut sequence = Sequence::new();
        let mut source = MockManifestSource::new();
        source
            .expect_load()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(manifest()));
        source
            .expect_load()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Err(LoadError::Signature(SignatureError::Mismatch)));
        let harness = harness(source).await;
        give_tool(&harness.host, "a", "search");

        harness.coordinator.run().await;
        harness.clock.set_millis(301_000);
        let summary = harness.coordinator.run().await;

        assert_eq!(summary.manifest, ManifestStatus::Stale);
        assert_eq!(summary.succeeded, 1);
        assert!(harness.coordinator.registry().resolve("search").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn degraded_connectors_lose_tools_after_grace() {
        let mut source = MockManifestSource::new();
        source.expect_load().times(1).returning(|| Ok(manifest()));
        let harness = harness(source).await;
        give_tool(&harness.host, "a", "search");
        let registry = Arc::clone(harness.coordinator.registry());
        let connector = ConnectorId::new("a").expect("valid id");

        harness.coordinator.run().await;
        harness
            .host
            .set_failing(connector.clone(), "connection reset")
            .expect("failure injected");
        let call = registry.call("search", json!({})).await;
        assert!(call.is_err());

        harness.clock.set_millis(500);
        let within_grace = harness.coordinator.run().await;
        assert_eq!(within_grace.failed.len(), 1);
        assert!(registry.resolve("search").is_some());

        harness.clock.set_millis(1_500);
        let past_grace = harness.coordinator.run().await;
        assert_eq!(
            past_grace.failed.first().map(|failure| failure.consecutive_failures),
            Some(3)
        );
        assert!(registry.resolve("search").is_none());
        let states = harness.coordinator.proxy_states().await;
        assert_eq!(
            states.first().map(|state| state.state),
            Some(ConnectionState::Degraded)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shadowed_tool_is_registered_once_its_owner_is_removed() {
        let mut sequence = Sequence::new();
        let mut source = MockManifestSource::new();
        let passes = [
            vec![("a", true)],
            vec![("a", true), ("b", true)],
            vec![("b", true)],
        ];
        for connectors in passes {
            source
                .expect_load()
                .times(1)
                .in_sequence(&mut sequence)
                .returning(move || Ok(loaded_manifest(0, 300, &connectors)));
        }
        let harness = harness(source).await;
        give_tool(&harness.host, "a", "search");
        give_tool(&harness.host, "b", "search");
        let registry = Arc::clone(harness.coordinator.registry());
        let owner = |name: &str| {
            registry
                .resolve(name)
                .map(|entry| entry.connector_id().to_string())
        };

        harness.coordinator.run().await;
        harness.clock.set_millis(301_000);
        let collided = harness.coordinator.run().await;
        assert_eq!(collided.succeeded, 2);
        assert_eq!(owner("search").as_deref(), Some("a"));

        harness.clock.set_millis(602_000);
        let summary = harness.coordinator.run().await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(owner("search").as_deref(), Some("b"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_closes_proxies_and_withdraws_tools() {
        let mut source = MockManifestSource::new();
        source.expect_load().times(1).returning(|| Ok(manifest()));
        let harness = harness(source).await;
        give_tool(&harness.host, "a", "search");
        harness.coordinator.run().await;

        harness.coordinator.shutdown().await;

        assert!(harness.coordinator.registry().is_empty());
        assert!(harness.coordinator.proxy_states().await.is_empty());
        assert!(!harness.host.is_connected(&ConnectorId::new("a").expect("valid id")));
    }
}
