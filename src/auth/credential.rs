//! Bearer credential with expiry derived from the token itself.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// The claims we care about. The client never verifies the signature (it has
/// no key); it only needs `exp` to decide when to renew.
#[derive(Debug, Deserialize)]
struct Claims {
  exp: i64,
}

/// An access token plus the expiry instant decoded from its payload.
///
/// The expiry is always recomputed from the token's own claims, never taken
/// from a side channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
  token: String,
  expires_at: DateTime<Utc>,
}

impl Credential {
  /// Decode a JWT's payload segment and build a credential from it.
  pub fn decode(token: &str) -> Result<Self> {
    let payload = token
      .split('.')
      .nth(1)
      .ok_or_else(|| Error::Decode("token has no payload segment".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
      .decode(payload)
      .map_err(|e| Error::Decode(format!("token payload is not base64url: {}", e)))?;

    let claims: Claims = serde_json::from_slice(&bytes)
      .map_err(|e| Error::Decode(format!("token claims are not valid JSON: {}", e)))?;

    let expires_at = Utc
      .timestamp_opt(claims.exp, 0)
      .single()
      .ok_or_else(|| Error::Decode(format!("token exp out of range: {}", claims.exp)))?;

    Ok(Self {
      token: token.to_string(),
      expires_at,
    })
  }

  pub fn token(&self) -> &str {
    &self.token
  }

  pub fn expires_at(&self) -> DateTime<Utc> {
    self.expires_at
  }

  /// True if the token is still valid `margin` from now. Tokens inside the
  /// margin are treated as expired so the renewed token is attached to the
  /// request that noticed, not the one after.
  pub fn is_fresh(&self, margin: Duration) -> bool {
    self.expires_at - Utc::now() > margin
  }

  /// Render the `Authorization` header value.
  pub fn bearer(&self) -> String {
    format!("Bearer {}", self.token)
  }
}
