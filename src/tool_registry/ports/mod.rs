//! Port contracts for connector hosting and registry persistence.

mod host;
mod store;

pub use host::{ConnectorError, ConnectorHost, ConnectorHostResult};
pub use store::{PersistenceError, RegistrySnapshotStore, RegistryStoreResult};
