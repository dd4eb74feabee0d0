//! Domain model for the signed connector manifest.
//!
//! The manifest lists every known connector together with its endpoint,
//! scopes, and enablement. A payload only exists once its signature has been
//! verified; transport and caching concerns remain outside this boundary.

mod connector;
mod error;
mod payload;

pub use connector::{ConnectorDescriptor, ConnectorId};
pub use error::{LoadError, ManifestDomainError, SignatureError};
pub use payload::{
    LoadedManifest, ManifestPayload, SIGNATURE_FIELD, SignedManifestDocument,
    canonical_body_bytes,
};
