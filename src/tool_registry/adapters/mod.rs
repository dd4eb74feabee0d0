//! Adapter implementations for connector hosting and registry persistence.

pub mod memory;

mod fs;
mod http;
mod runtime;

pub use fs::{FileRegistryStore, StagedSnapshot};
pub use http::HttpConnectorHost;
pub use runtime::InMemoryConnectorHost;
