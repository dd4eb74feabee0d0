//! Outcome of one synchronisation pass.

use crate::manifest::domain::ConnectorId;
use serde::Serialize;
use std::fmt;

/// Where the pass got its manifest from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    /// A fresh manifest was fetched and verified.
    Refreshed,
    /// The cached manifest was still within its TTL.
    Reused,
    /// The refresh failed and the last good manifest was served.
    Stale,
    /// No manifest has ever been loaded; the pass did nothing.
    Unavailable,
}

impl ManifestStatus {
    /// Returns the log representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Refreshed => "refreshed",
            Self::Reused => "reused",
            Self::Stale => "stale",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One connector that failed during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    /// Connector identifier.
    pub id: ConnectorId,
    /// Failure message.
    pub error: String,
    /// Failures since the connector last connected.
    pub consecutive_failures: u32,
}

/// Aggregate result of [`super::SyncCoordinator::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// Enabled connectors the pass tried to bring up.
    pub attempted: usize,
    /// Connectors that ended the pass connected.
    pub succeeded: usize,
    /// Itemised failures, ordered by connector id.
    pub failed: Vec<SyncFailure>,
    /// Manifest provenance for this pass.
    pub manifest: ManifestStatus,
}

impl SyncSummary {
    /// Summary for a pass that had no manifest to work from.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: Vec::new(),
            manifest: ManifestStatus::Unavailable,
        }
    }

    /// Returns whether every attempted connector succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
