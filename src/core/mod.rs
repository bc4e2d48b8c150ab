//! In-memory authoritative store and index helpers.

/// Unique name index helpers.
pub mod indices;
/// Authoritative contact store.
pub mod store;
