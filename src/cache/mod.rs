//! Content-addressable artifact cache.
//!
//! Renderers derive a [`fingerprint::Fingerprint`] from their inputs and parameters, then ask the
//! [`store::CacheStore`] for it before doing any encoding work.

/// Entry, artifact and statistics types.
pub mod entry;
/// Deterministic cache keys.
pub mod fingerprint;
/// On-disk store.
pub mod store;
