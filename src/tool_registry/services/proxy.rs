//! Per-connector live connection with its state machine.

use super::registry::ToolHandler;
use crate::manifest::domain::{ConnectorDescriptor, ConnectorId};
use crate::tool_registry::{
    domain::{ConnectionState, ConnectorProxyState, ToolDefinition},
    ports::{ConnectorError, ConnectorHost, ConnectorHostResult},
};
use async_trait::async_trait;
use mockable::Clock;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of [`ConnectorProxy::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Already connected with the same endpoint and scopes; nothing was done.
    Unchanged,
    /// A new connection was established and the tool list fetched.
    Connected {
        /// Tools reported by the connector.
        tools: Vec<ToolDefinition>,
    },
}

struct ProxyInner {
    status: ConnectorProxyState,
    descriptor: Option<ConnectorDescriptor>,
    tools: Vec<ToolDefinition>,
}

/// Live connection to one connector.
///
/// `ensure` and `close` are serialised per proxy; status reads and tool calls
/// never wait on an in-flight connect. A closed proxy must be discarded.
pub struct ConnectorProxy<H, C>
where
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    id: ConnectorId,
    host: Arc<H>,
    clock: Arc<C>,
    timeout: Duration,
    ensure_gate: tokio::sync::Mutex<()>,
    inner: Mutex<ProxyInner>,
}

impl<H, C> ConnectorProxy<H, C>
where
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    /// Creates a disconnected proxy.
    ///
    /// `timeout` bounds connect plus tool listing, and each forwarded call.
    #[must_use]
    pub fn new(id: ConnectorId, host: Arc<H>, clock: Arc<C>, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(ProxyInner {
                status: ConnectorProxyState::disconnected(id.clone()),
                descriptor: None,
                tools: Vec::new(),
            }),
            id,
            host,
            clock,
            timeout,
            ensure_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the connector identifier.
    #[must_use]
    pub const fn id(&self) -> &ConnectorId {
        &self.id
    }

    fn inner(&self) -> MutexGuard<'_, ProxyInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> i64 {
        self.clock.utc().timestamp_millis()
    }

    fn timeout_error(&self) -> ConnectorError {
        ConnectorError::Timeout {
            connector_id: self.id.clone(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns a snapshot of the proxy state.
    #[must_use]
    pub fn status(&self) -> ConnectorProxyState {
        self.inner().status.clone()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner().status.state
    }

    /// Returns the tools reported on the last successful connect.
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDefinition> {
        self.inner().tools.clone()
    }

    /// Returns whether the proxy has been degraded for at least `grace`.
    #[must_use]
    pub fn degraded_past_grace(&self, grace: Duration) -> bool {
        let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        let now_ms = self.now_ms();
        let inner = self.inner();
        inner.status.state == ConnectionState::Degraded
            && inner
                .status
                .degraded_since_ms
                .is_some_and(|since| now_ms.saturating_sub(since) >= grace_ms)
    }

    /// Brings the proxy to `connected` for `descriptor`.
    ///
    /// Does nothing when already connected with the same endpoint and scopes.
    /// A connected proxy whose endpoint or scopes changed is disconnected and
    /// reconnected.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::Closed`] for a closed proxy. Any connect or
    /// listing failure moves the proxy to `degraded` and is returned.
    pub async fn ensure(
        &self,
        descriptor: &ConnectorDescriptor,
    ) -> ConnectorHostResult<EnsureOutcome> {
        let _gate = self.ensure_gate.lock().await;

        let previous = {
            let mut inner = self.inner();
            match inner.status.state {
                ConnectionState::Closed => return Err(ConnectorError::Closed(self.id.clone())),
                ConnectionState::Connected
                    if inner
                        .descriptor
                        .as_ref()
                        .is_some_and(|current| current.same_connection(descriptor)) =>
                {
                    inner.descriptor = Some(descriptor.clone());
                    return Ok(EnsureOutcome::Unchanged);
                }
                ConnectionState::Connected => inner.descriptor.clone(),
                _ => None,
            }
        };

        if let Some(stale) = previous {
            debug!(connector_id = %self.id, "connector endpoint or scopes changed, reconnecting");
            if let Err(err) = self.host.disconnect(&stale).await {
                warn!(connector_id = %self.id, error = %err, "failed to release previous connection");
            }
        }

        {
            let mut inner = self.inner();
            if inner.status.state != ConnectionState::Connecting {
                inner.status.state = inner.status.state.transition_to(ConnectionState::Connecting)?;
            }
            inner.descriptor = Some(descriptor.clone());
        }

        let attempt = async {
            self.host.connect(descriptor).await?;
            self.host.list_tools(descriptor).await
        };
        let result = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        };

        let now_ms = self.now_ms();
        let mut inner = self.inner();
        match result {
            Ok(tools) => {
                inner.status.state = inner.status.state.transition_to(ConnectionState::Connected)?;
                inner.status.tool_names = tools.iter().map(|tool| tool.name().to_owned()).collect();
                inner.status.last_error = None;
                inner.status.connected_at_ms = Some(now_ms);
                inner.status.consecutive_failures = 0;
                inner.status.degraded_since_ms = None;
                inner.tools.clone_from(&tools);
                Ok(EnsureOutcome::Connected { tools })
            }
            Err(err) => {
                Self::mark_degraded(&mut inner, &err, now_ms);
                Err(err)
            }
        }
    }

    fn mark_degraded(inner: &mut ProxyInner, err: &ConnectorError, now_ms: i64) {
        inner.status.state = ConnectionState::Degraded;
        inner.status.last_error = Some(err.to_string());
        inner.status.connected_at_ms = None;
        inner.status.consecutive_failures = inner.status.consecutive_failures.saturating_add(1);
        inner.status.degraded_since_ms.get_or_insert(now_ms);
    }

    /// Forwards a tool call to the connector.
    ///
    /// Transport failures and timeouts degrade the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotConnected`] unless the proxy is connected,
    /// or the host's error for the call.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> ConnectorHostResult<Value> {
        let descriptor = {
            let inner = self.inner();
            match (inner.status.state, inner.descriptor.as_ref()) {
                (ConnectionState::Closed, _) => return Err(ConnectorError::Closed(self.id.clone())),
                (state, Some(descriptor)) if state.can_call_tools() => descriptor.clone(),
                _ => return Err(ConnectorError::NotConnected(self.id.clone())),
            }
        };

        let call = self.host.call_tool(&descriptor, tool_name, arguments);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(self.timeout_error()),
        };

        if let Err(err) = &result
            && matches!(
                err,
                ConnectorError::Transport(_) | ConnectorError::Timeout { .. }
            )
        {
            let now_ms = self.now_ms();
            let mut inner = self.inner();
            if inner.status.state == ConnectionState::Connected {
                Self::mark_degraded(&mut inner, err, now_ms);
            }
        }
        result
    }

    /// Disconnects and moves the proxy to the terminal `closed` state.
    ///
    /// Waits for an in-flight `ensure` to finish first. Closing twice is a
    /// no-op.
    pub async fn close(&self) {
        let _gate = self.ensure_gate.lock().await;
        let descriptor = {
            let inner = self.inner();
            if inner.status.state == ConnectionState::Closed {
                return;
            }
            inner.descriptor.clone()
        };

        if let Some(current) = descriptor
            && let Err(err) = self.host.disconnect(&current).await
        {
            warn!(connector_id = %self.id, error = %err, "failed to disconnect connector");
        }

        let mut inner = self.inner();
        inner.status.state = ConnectionState::Closed;
        inner.status.connected_at_ms = None;
        inner.tools.clear();
    }
}

/// Registry handler forwarding one tool to its owning proxy.
pub struct ProxyToolHandler<H, C>
where
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    proxy: Arc<ConnectorProxy<H, C>>,
    tool_name: String,
}

impl<H, C> ProxyToolHandler<H, C>
where
    H: ConnectorHost,
    C: Clock + Send + Sync,
{
    /// Creates a handler for the connector-side `tool_name`.
    #[must_use]
    pub fn new(proxy: Arc<ConnectorProxy<H, C>>, tool_name: impl Into<String>) -> Self {
        Self {
            proxy,
            tool_name: tool_name.into(),
        }
    }
}

#[async_trait]
impl<H, C> ToolHandler for ProxyToolHandler<H, C>
where
    H: ConnectorHost + 'static,
    C: Clock + Send + Sync + 'static,
{
    async fn call(&self, arguments: Value) -> ConnectorHostResult<Value> {
        self.proxy.call_tool(&self.tool_name, arguments).await
    }
}
