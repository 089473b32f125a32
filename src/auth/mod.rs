//! Credential lifecycle: storage, decoding, and coalesced renewal.

pub mod credential;
pub mod manager;
pub mod store;

pub use credential::Credential;
pub use manager::TokenManager;
pub use store::{FileStore, MemoryStore, TokenStore};
