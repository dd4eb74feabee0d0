//! Manifest services.

mod cache;

pub use cache::{ManifestCache, ManifestCacheEntry};
