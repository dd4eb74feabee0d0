//! In-memory connector host for tests and local deterministic runs.

use crate::manifest::domain::{ConnectorDescriptor, ConnectorId};
use crate::tool_registry::{
    domain::ToolDefinition,
    ports::{ConnectorError, ConnectorHost, ConnectorHostResult},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// In-memory connector host.
///
/// Models connect, list, and call behaviour without any network I/O. Failures
/// and latency can be injected per connector, and the host records connect
/// counts and peak concurrency so tests can assert on fan-out behaviour.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnectorHost {
    state: Arc<RwLock<InMemoryHostState>>,
    gauge: Arc<ConcurrencyGauge>,
}

#[derive(Debug, Default)]
struct InMemoryHostState {
    connected: HashSet<ConnectorId>,
    failing: HashMap<ConnectorId, String>,
    tool_catalogs: HashMap<ConnectorId, Vec<ToolDefinition>>,
    connect_counts: HashMap<ConnectorId, usize>,
    connect_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct ConcurrencyGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }
}

/// Decrements the gauge even when a timed-out connect is dropped.
struct GaugeGuard<'a> {
    gauge: &'a ConcurrencyGauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

fn host_error(err: impl ToString) -> ConnectorError {
    ConnectorError::transport(std::io::Error::other(err.to_string()))
}

impl InMemoryConnectorHost {
    /// Creates an empty in-memory host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a tool catalogue with a connector, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_tool_catalog(
        &self,
        connector_id: ConnectorId,
        tools: Vec<ToolDefinition>,
    ) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        state.tool_catalogs.insert(connector_id, tools);
        Ok(())
    }

    /// Makes every subsequent connect, listing, and call for `connector_id`
    /// fail with `message`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_failing(
        &self,
        connector_id: ConnectorId,
        message: impl Into<String>,
    ) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        state.connected.remove(&connector_id);
        state
            .failing
            .insert(connector_id, message.into().trim().to_owned());
        Ok(())
    }

    /// Clears injected failures for `connector_id`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_healthy(&self, connector_id: &ConnectorId) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        state.failing.remove(connector_id);
        Ok(())
    }

    /// Delays every connect by `delay`.
    ///
    /// # Errors
    ///
    /// Returns a transport error when lock acquisition fails.
    pub fn set_connect_delay(&self, delay: Duration) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        state.connect_delay = Some(delay);
        Ok(())
    }

    /// Returns how many connects have been attempted for `connector_id`.
    #[must_use]
    pub fn connect_count(&self, connector_id: &ConnectorId) -> usize {
        self.state
            .read()
            .map(|state| {
                state
                    .connect_counts
                    .get(connector_id)
                    .copied()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Returns whether the host holds an open session for `connector_id`.
    #[must_use]
    pub fn is_connected(&self, connector_id: &ConnectorId) -> bool {
        self.state
            .read()
            .is_ok_and(|state| state.connected.contains(connector_id))
    }

    /// Returns the highest number of connects ever in flight at once.
    #[must_use]
    pub fn peak_concurrent_connects(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    fn begin_connect(&self, connector_id: &ConnectorId) -> ConnectorHostResult<Option<Duration>> {
        let mut state = self.state.write().map_err(host_error)?;
        *state
            .connect_counts
            .entry(connector_id.clone())
            .or_default() += 1;
        Ok(state.connect_delay)
    }

    fn finish_connect(&self, connector_id: &ConnectorId) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        if let Some(message) = state.failing.get(connector_id) {
            return Err(host_error(message));
        }
        state.connected.insert(connector_id.clone());
        Ok(())
    }

    fn require_connected(&self, connector_id: &ConnectorId) -> ConnectorHostResult<()> {
        let state = self.state.read().map_err(host_error)?;
        if let Some(message) = state.failing.get(connector_id) {
            return Err(host_error(message));
        }
        if state.connected.contains(connector_id) {
            Ok(())
        } else {
            Err(ConnectorError::NotConnected(connector_id.clone()))
        }
    }
}

#[async_trait]
impl ConnectorHost for InMemoryConnectorHost {
    async fn connect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()> {
        let _in_flight = self.gauge.enter();
        if let Some(delay) = self.begin_connect(connector.id())? {
            tokio::time::sleep(delay).await;
        }
        self.finish_connect(connector.id())
    }

    async fn disconnect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()> {
        let mut state = self.state.write().map_err(host_error)?;
        state.connected.remove(connector.id());
        Ok(())
    }

    async fn list_tools(
        &self,
        connector: &ConnectorDescriptor,
    ) -> ConnectorHostResult<Vec<ToolDefinition>> {
        self.require_connected(connector.id())?;
        let state = self.state.read().map_err(host_error)?;
        Ok(state
            .tool_catalogs
            .get(connector.id())
            .cloned()
            .unwrap_or_default())
    }

    async fn call_tool(
        &self,
        connector: &ConnectorDescriptor,
        tool_name: &str,
        arguments: Value,
    ) -> ConnectorHostResult<Value> {
        self.require_connected(connector.id())?;
        Ok(json!({
            "connector": connector.id().as_str(),
            "tool": tool_name,
            "arguments": arguments,
        }))
    }
}
