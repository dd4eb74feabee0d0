//! Port contracts for manifest retrieval and verification.

mod source;
mod verifier;

#[cfg(test)]
pub use source::MockManifestSource;
pub use source::{ManifestLoadResult, ManifestSource};
pub use verifier::ManifestVerifier;
