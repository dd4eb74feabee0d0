//! Adapter implementations for manifest source and verifier ports.

mod http;
mod memory;
mod signature;

pub use http::HttpManifestSource;
pub use memory::ScriptedManifestSource;
pub use signature::{HmacManifestVerifier, UnverifiedManifests};
