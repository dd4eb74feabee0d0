//! Registry record derivation for manifest connectors.

use crate::manifest::domain::ConnectorDescriptor;
use crate::tool_registry::domain::{ConnectorProxyState, ConnectorTransport, RegistryRecord};
use serde_json::json;

/// State recorded for connectors the manifest lists as disabled.
const DISABLED_STATE: &str = "disabled";

/// Builds the record for `descriptor` as seen in a manifest generated at
/// `generated_at_ms`.
///
/// The content depends only on its inputs, so an unchanged manifest and
/// unchanged proxy outcome always produce an identical record.
pub(crate) fn registry_record(
    descriptor: &ConnectorDescriptor,
    generated_at_ms: i64,
    status: Option<&ConnectorProxyState>,
) -> RegistryRecord {
    let transport = ConnectorTransport::from_endpoint(descriptor.endpoint_url())
        .map_or_else(|_| "unknown".to_owned(), |transport| transport.kind().to_owned());

    let (state, tool_count, last_error) = match status {
        Some(proxy) if descriptor.enabled() => (
            proxy.state.as_str(),
            proxy.tool_names.len(),
            proxy.last_error.clone(),
        ),
        _ => (DISABLED_STATE, 0, None),
    };

    RegistryRecord {
        name: descriptor.id().as_str().to_owned(),
        version: descriptor.version().map(str::to_owned),
        transport,
        last_seen_ms: generated_at_ms,
        metadata: json!({
            "enabled": descriptor.enabled(),
            "endpointUrl": descriptor.endpoint_url(),
            "scopes": descriptor.scopes(),
            "tags": descriptor.tags(),
            "state": state,
            "toolCount": tool_count,
            "lastError": last_error,
        }),
    }
}
