//! JSON-RPC over HTTP connector host.
//!
//! Speaks the request/response subset of the MCP streamable HTTP transport:
//! every call is a `POST` of one JSON-RPC 2.0 request to the connector's
//! endpoint URL, answered either with `application/json` or with a
//! `text/event-stream` body whose first `message` event carries the reply.
//! The `Mcp-Session-Id` header returned by `initialize` is replayed on later
//! requests for the same connector.

use crate::manifest::domain::{ConnectorDescriptor, ConnectorId};
use crate::tool_registry::{
    domain::{ConnectorTransport, ToolDefinition},
    ports::{ConnectorError, ConnectorHost, ConnectorHostResult},
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2025-06-18";

/// Connector host that forwards over the shared HTTP connection pool.
#[derive(Clone)]
pub struct HttpConnectorHost {
    client: reqwest::Client,
    sessions: Arc<Mutex<HashMap<ConnectorId, String>>>,
    next_request_id: Arc<AtomicU64>,
}

#[derive(Debug, Error)]
enum RpcError {
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("response carried neither result nor error")]
    MissingResult,
    #[error("malformed response body: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolListResult {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
}

impl HttpConnectorHost {
    /// Creates a host that issues every request through `client`.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn endpoint(connector: &ConnectorDescriptor) -> ConnectorHostResult<String> {
        let transport = ConnectorTransport::from_endpoint(connector.endpoint_url()).map_err(
            |err| ConnectorError::UnsupportedTransport {
                connector_id: connector.id().clone(),
                reason: err.to_string(),
            },
        )?;
        match transport {
            ConnectorTransport::HttpSse(config) => Ok(config.base_url().to_owned()),
            ConnectorTransport::Stdio(config) => Err(ConnectorError::UnsupportedTransport {
                connector_id: connector.id().clone(),
                reason: format!(
                    "stdio command '{}' cannot be reached over HTTP",
                    config.command()
                ),
            }),
        }
    }

    async fn headers(&self, connector_id: &ConnectorId) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        let sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(connector_id)
            && let Ok(value) = HeaderValue::from_str(session)
        {
            headers.insert(SESSION_HEADER, value);
        }
        headers
    }

    async fn request(
        &self,
        connector: &ConnectorDescriptor,
        method: &str,
        params: Value,
    ) -> ConnectorHostResult<Value> {
        let url = Self::endpoint(connector)?;
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(connector_id = %connector.id(), method, request_id = id, "sending connector request");

        let response = self
            .client
            .post(&url)
            .headers(self.headers(connector.id()).await)
            .json(&body)
            .send()
            .await
            .map_err(ConnectorError::transport)?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            self.sessions
                .lock()
                .await
                .insert(connector.id().clone(), session.to_owned());
        }

        let status = response.status();
        if !status.is_success() {
            return Err(ConnectorError::transport(RpcError::Status(status.as_u16())));
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/event-stream"));
        let text = response.text().await.map_err(ConnectorError::transport)?;
        let payload = if is_event_stream {
            first_event_data(&text).ok_or_else(|| {
                ConnectorError::transport(RpcError::Malformed("no message event".to_owned()))
            })?
        } else {
            text
        };

        let decoded: RpcResponse = serde_json::from_str(&payload)
            .map_err(|err| ConnectorError::transport(RpcError::Malformed(err.to_string())))?;
        if let Some(error) = decoded.error {
            return Err(ConnectorError::transport(RpcError::Remote {
                code: error.code,
                message: error.message,
            }));
        }
        decoded
            .result
            .ok_or_else(|| ConnectorError::transport(RpcError::MissingResult))
    }
}

/// Returns the data of the first `message` event in an SSE body.
///
/// Events may be framed with LF, CRLF or bare CR line endings.
fn first_event_data(body: &str) -> Option<String> {
    let normalised = body.replace("\r\n", "\n").replace('\r', "\n");
    normalised.split("\n\n").find_map(|raw_event| {
        let mut event_type = None;
        let mut data: Vec<&str> = Vec::new();
        for line in raw_event.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }
        let is_message = event_type.is_none_or(|kind| kind == "message");
        (is_message && !data.is_empty()).then(|| data.join("\n"))
    })
}

#[async_trait]
impl ConnectorHost for HttpConnectorHost {
    async fn connect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()> {
        self.sessions.lock().await.remove(connector.id());
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")},
        });
        self.request(connector, "initialize", params).await?;
        Ok(())
    }

    async fn disconnect(&self, connector: &ConnectorDescriptor) -> ConnectorHostResult<()> {
        self.sessions.lock().await.remove(connector.id());
        Ok(())
    }

    async fn list_tools(
        &self,
        connector: &ConnectorDescriptor,
    ) -> ConnectorHostResult<Vec<ToolDefinition>> {
        let result = self.request(connector, "tools/list", json!({})).await?;
        let listing: ToolListResult = serde_json::from_value(result)
            .map_err(|err| ConnectorError::InvalidToolList(err.to_string()))?;
        Ok(listing.tools)
    }

    async fn call_tool(
        &self,
        connector: &ConnectorDescriptor,
        tool_name: &str,
        arguments: Value,
    ) -> ConnectorHostResult<Value> {
        self.request(
            connector,
            "tools/call",
            json!({"name": tool_name, "arguments": arguments}),
        )
        .await
    }
}
