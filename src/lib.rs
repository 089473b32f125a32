//! Client-side data access layer for the Chirp social API.
//!
//! Everything a UI needs to talk to the server lives behind [`Session`]:
//! a token lifecycle manager that renews the bearer credential with
//! coalesced, never-stampeded refresh calls; a request pipeline that
//! attaches authorization and unwraps response envelopes; a query cache
//! keyed by deterministic fingerprints with read-through fetch and
//! prefix invalidation; and an optimistic toggle engine for set-membership
//! actions (like, follow) with precise rollback on server rejection.
//!
//! # Example
//!
//! ```ignore
//! let config = Config::for_base_url("http://localhost:8888");
//! let session = Session::new(&config)?;
//!
//! session.login("ann@example.com", "hunter2").await?;
//!
//! let key = QueryKey::list("posts").page(1).limit(10);
//! let posts = session.posts(&key).await?;
//!
//! // Appears liked immediately; rolled back if the server says no.
//! session.toggle_like(&key, &posts[0].id).await?;
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod toggle;
pub mod types;

#[cfg(test)]
mod testutil;

pub use auth::{Credential, TokenManager, TokenStore};
pub use cache::{CacheEntry, EntryStatus, QueryCache, QueryKey};
pub use config::Config;
pub use error::{Error, Result};
pub use http::{HttpRequest, HttpResponse, RequestPipeline, Transport};
pub use session::Session;
pub use toggle::{MembershipField, ToggleEngine};
pub use types::{Chat, Notification, Page, PageInfo, Post, User};
