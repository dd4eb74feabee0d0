//! Synchronisation passes and the scheduler that drives them.
//!
//! [`SyncCoordinator::run`] loads or reuses the manifest, brings every
//! enabled connector up under a concurrency bound, updates the tool
//! registry, and records every manifest connector. [`RefreshScheduler`]
//! triggers passes on a jittered interval without ever overlapping them.

mod coordinator;
mod records;
mod scheduler;
mod summary;

pub use coordinator::{DEFAULT_SYNC_CONCURRENCY, SyncCoordinator, SyncDependencies, SyncSettings};
pub use scheduler::{RefreshScheduler, SchedulerError, jittered_delay};
pub use summary::{ManifestStatus, SyncFailure, SyncSummary};
