//! Token lifecycle manager.
//!
//! Holds the one current credential and renews it through `/auth/refresh`
//! when it is expired or about to expire. Renewal is coalesced: the first
//! caller to notice claims a single pending-renewal slot and issues the
//! request; every concurrent caller attaches to that slot and is released
//! with the same outcome. N concurrent `ensure_valid` calls against an
//! expired token make exactly one network call.

use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};

use crate::auth::credential::Credential;
use crate::auth::store::TokenStore;
use crate::error::{Error, Result};
use crate::http::transport::{HttpRequest, Transport};
use crate::types::LoginResponse;

/// Outcome channel for one in-flight renewal. `None` until the renewal
/// settles; the watch channel retains the final value, so waiters that
/// attached before the slot was cleared still observe it.
type RenewalSlot = watch::Receiver<Option<Result<Credential>>>;

pub struct TokenManager {
  store: Arc<dyn TokenStore>,
  transport: Arc<dyn Transport>,
  margin: chrono::Duration,
  current: RwLock<Option<Credential>>,
  pending: Mutex<Option<RenewalSlot>>,
}

impl TokenManager {
  pub fn new(
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn Transport>,
    margin: chrono::Duration,
  ) -> Self {
    Self {
      store,
      transport,
      margin,
      current: RwLock::new(None),
      pending: Mutex::new(None),
    }
  }

  /// Return a credential guaranteed valid for at least the safety margin,
  /// renewing first if necessary. Safe to call from many in-flight requests
  /// at once.
  pub async fn ensure_valid(&self) -> Result<Credential> {
    // Fast path: the held credential is still fresh. Clone out of the read
    // guard before any other lock is touched.
    let held = { self.current.read().await.clone() };
    match held {
      Some(credential) if credential.is_fresh(self.margin) => return Ok(credential),
      Some(_) => {}
      None => {
        if let Some(credential) = self.load_from_store().await? {
          return Ok(credential);
        }
      }
    }

    // Expired or expiring: claim the renewal slot or attach to it.
    let (owned_tx, mut slot_rx) = {
      let mut pending = self
        .pending
        .lock()
        .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;

      match pending.as_ref() {
        Some(rx) => (None, rx.clone()),
        None => {
          let (tx, rx) = watch::channel(None);
          *pending = Some(rx.clone());
          (Some(tx), rx)
        }
      }
    };

    let Some(tx) = owned_tx else {
      // Renewal already in flight: await its outcome instead of stampeding.
      let settled = slot_rx
        .wait_for(|outcome| outcome.is_some())
        .await
        .map_err(|_| Error::AuthExpired)?;
      return settled.clone().unwrap_or(Err(Error::AuthExpired));
    };

    // We own the slot. Re-check first: another renewal may have finished
    // between the fast path and the claim.
    let recheck = { self.current.read().await.clone() };
    let outcome = match recheck {
      Some(credential) if credential.is_fresh(self.margin) => Ok(credential),
      _ => self.renew().await,
    };

    let _ = tx.send(Some(outcome.clone()));
    if let Ok(mut pending) = self.pending.lock() {
      *pending = None;
    }

    outcome
  }

  /// Install a freshly issued token (login path): decode, persist, hold.
  pub async fn install(&self, token: &str) -> Result<Credential> {
    let credential = Credential::decode(token)?;
    self.store.save(token)?;
    *self.current.write().await = Some(credential.clone());
    tracing::debug!(expires_at = %credential.expires_at(), "credential installed");
    Ok(credential)
  }

  /// Drop the credential everywhere (logout path).
  pub async fn clear(&self) -> Result<()> {
    *self.current.write().await = None;
    self.store.clear()
  }

  /// First call of a session: pick up a persisted token if one is present
  /// and still fresh. A stale or undecodable persisted token is ignored;
  /// the renewal path deals with it.
  async fn load_from_store(&self) -> Result<Option<Credential>> {
    let Some(token) = self.store.load()? else {
      return Ok(None);
    };

    match Credential::decode(&token) {
      Ok(credential) if credential.is_fresh(self.margin) => {
        *self.current.write().await = Some(credential.clone());
        tracing::debug!(expires_at = %credential.expires_at(), "credential loaded from store");
        Ok(Some(credential))
      }
      _ => Ok(None),
    }
  }

  /// Issue the single renewal request. Anonymous: the long-lived proof is
  /// the cookie the transport carries, and recursing into `ensure_valid`
  /// here would deadlock on the slot we own.
  async fn renew(&self) -> Result<Credential> {
    tracing::debug!("renewing access token");

    let result = self
      .transport
      .execute(HttpRequest::get("/auth/refresh"))
      .await;

    let credential = match result {
      Ok(response) if response.is_success() => {
        let body: LoginResponse = serde_json::from_value(response.body)
          .map_err(|e| Error::Decode(format!("malformed refresh response: {}", e)))?;
        Credential::decode(&body.ac_token)
      }
      Ok(response) => {
        tracing::warn!(status = response.status, "token renewal rejected");
        Err(Error::AuthExpired)
      }
      Err(e) => {
        tracing::warn!(error = %e, "token renewal failed");
        Err(Error::AuthExpired)
      }
    };

    match credential {
      Ok(credential) => {
        self.store.save(credential.token())?;
        *self.current.write().await = Some(credential.clone());
        tracing::debug!(expires_at = %credential.expires_at(), "access token renewed");
        Ok(credential)
      }
      Err(_) => {
        // Renewal failure is fatal to the session: tear the credential down
        // so every waiter sees a clean auth failure.
        *self.current.write().await = None;
        let _ = self.store.clear();
        Err(Error::AuthExpired)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::store::MemoryStore;
  use crate::testutil::{make_jwt, FakeTransport};
  use chrono::{Duration, Utc};
  use futures::future::join_all;
  use serde_json::json;

  fn manager_with(store: MemoryStore, transport: FakeTransport) -> TokenManager {
    TokenManager::new(
      Arc::new(store),
      Arc::new(transport),
      Duration::seconds(30),
    )
  }

  #[tokio::test]
  async fn fresh_token_short_circuits() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let transport = FakeTransport::new();
    let manager = manager_with(MemoryStore::new(Some(token.clone())), transport.clone());

    let credential = manager.ensure_valid().await.unwrap();
    assert_eq!(credential.token(), token);
    // No network call at all
    assert_eq!(transport.request_count(), 0);
  }

  #[tokio::test]
  async fn expired_token_is_renewed_before_use() {
    let old = make_jwt(Utc::now() - Duration::hours(1));
    let fresh = make_jwt(Utc::now() + Duration::hours(1));

    let transport = FakeTransport::new();
    transport.respond("GET /auth/refresh", 200, json!({ "ac_token": fresh }));

    let manager = manager_with(MemoryStore::new(Some(old)), transport.clone());

    let credential = manager.ensure_valid().await.unwrap();
    assert_eq!(credential.token(), fresh);
    assert_eq!(transport.count_for("GET /auth/refresh"), 1);
  }

  #[tokio::test]
  async fn concurrent_renewal_is_coalesced() {
    let old = make_jwt(Utc::now() - Duration::hours(1));
    let fresh = make_jwt(Utc::now() + Duration::hours(1));

    let transport = FakeTransport::new().with_latency(std::time::Duration::from_millis(20));
    transport.respond("GET /auth/refresh", 200, json!({ "ac_token": fresh }));

    let manager = Arc::new(manager_with(MemoryStore::new(Some(old)), transport.clone()));

    let calls = (0..10).map(|_| {
      let manager = Arc::clone(&manager);
      async move { manager.ensure_valid().await }
    });
    let results = join_all(calls).await;

    // Exactly one renewal request; every caller got the same new token.
    assert_eq!(transport.count_for("GET /auth/refresh"), 1);
    for result in results {
      assert_eq!(result.unwrap().token(), fresh);
    }
  }

  #[tokio::test]
  async fn renewal_failure_releases_all_waiters_with_auth_expired() {
    let old = make_jwt(Utc::now() - Duration::hours(1));

    let transport = FakeTransport::new().with_latency(std::time::Duration::from_millis(20));
    transport.respond("GET /auth/refresh", 401, json!({ "message": "refresh expired" }));

    let store = MemoryStore::new(Some(old));
    let manager = Arc::new(manager_with(store, transport.clone()));

    let calls = (0..4).map(|_| {
      let manager = Arc::clone(&manager);
      async move { manager.ensure_valid().await }
    });
    let results = join_all(calls).await;

    assert_eq!(transport.count_for("GET /auth/refresh"), 1);
    for result in results {
      assert_eq!(result.unwrap_err(), Error::AuthExpired);
    }
  }

  #[tokio::test]
  async fn renewal_failure_clears_the_store() {
    let old = make_jwt(Utc::now() - Duration::hours(1));

    let transport = FakeTransport::new();
    transport.respond("GET /auth/refresh", 401, json!({ "message": "nope" }));

    let store = Arc::new(MemoryStore::new(Some(old)));
    let manager = TokenManager::new(store.clone(), Arc::new(transport), Duration::seconds(30));

    assert_eq!(manager.ensure_valid().await.unwrap_err(), Error::AuthExpired);
    assert_eq!(store.load().unwrap(), None);
  }

  #[tokio::test]
  async fn install_persists_and_holds() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let store = Arc::new(MemoryStore::default());
    let manager = TokenManager::new(
      store.clone(),
      Arc::new(FakeTransport::new()),
      Duration::seconds(30),
    );

    manager.install(&token).await.unwrap();
    assert_eq!(store.load().unwrap(), Some(token.clone()));
    assert_eq!(manager.ensure_valid().await.unwrap().token(), token);
  }
}
