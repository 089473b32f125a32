//! Query cache: deterministic fingerprints mapped to last-known results.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Keys entries by a readable query fingerprint
//! - Coalesces concurrent fetches for the same fingerprint
//! - Supports synchronous optimistic patches and precise rollback
//! - Invalidates by fingerprint prefix, refetching lazily

pub mod key;
pub mod store;

pub use key::QueryKey;
pub use store::{CacheEntry, EntryStatus, QueryCache};
