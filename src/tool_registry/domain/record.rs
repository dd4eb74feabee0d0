//! Persisted registry record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Durable entry for every connector ever seen in a manifest.
///
/// Records outlive live connections: disabled and removed connectors keep
/// their last record for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    /// Connector identifier, used as the record key.
    pub name: String,
    /// Advertised connector version, if any.
    #[serde(default)]
    pub version: Option<String>,
    /// Transport kind, `http_sse` or `stdio`, or `unknown` when unparsable.
    pub transport: String,
    /// Generation time of the manifest that last listed the connector.
    pub last_seen_ms: i64,
    /// Free-form status metadata.
    #[serde(default)]
    pub metadata: Value,
}
