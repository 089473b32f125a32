//! Error taxonomy for the data access layer.
//!
//! Every failure a caller can observe is one of these variants. The enum is
//! `Clone` because a single fetch or renewal outcome may be handed to many
//! coalesced waiters.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
  /// Token renewal failed, or the server rejected the bearer outright
  /// (401). Fatal to the session: the caller must treat this as a logout
  /// (credential and cache are already cleared).
  #[error("authentication expired")]
  AuthExpired,

  /// Transport-level failure (connection refused, timeout, DNS). Transient;
  /// never retried automatically.
  #[error("network failure: {0}")]
  Network(String),

  /// The server rejected the payload shape (400/422). Message is surfaced
  /// verbatim to the UI layer.
  #[error("validation rejected ({status}): {message}")]
  ValidationRejected { status: u16, message: String },

  /// 404 from the server.
  #[error("not found: {message}")]
  NotFound { message: String },

  /// 409 from the server.
  #[error("conflict: {message}")]
  Conflict { message: String },

  /// Any other non-success status.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// Malformed token, response body, or configuration.
  #[error("decode error: {0}")]
  Decode(String),

  /// Client-local failure (lock poisoning, filesystem, environment).
  /// Never produced by a server response.
  #[error("internal error: {0}")]
  Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  /// Map a non-success HTTP status and server-provided message to a variant.
  ///
  /// 401 on a bearer-carrying request means the token was revoked despite a
  /// fresh expiry, which is an auth failure. 403 is a domain-level refusal
  /// (the token is fine, the action is not allowed) and must never tear the
  /// session down, so it maps to `Server` like any other rejection.
  pub fn from_status(status: u16, message: String) -> Self {
    match status {
      400 | 422 => Error::ValidationRejected { status, message },
      404 => Error::NotFound { message },
      409 => Error::Conflict { message },
      401 => Error::AuthExpired,
      _ => Error::Server { status, message },
    }
  }
}
