//! Shared test doubles: a scripted transport and token fixtures.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::transport::{BoxFuture, HttpRequest, HttpResponse, Method, Transport};

/// Build an unsigned JWT whose payload carries the given expiry.
/// The client never checks signatures, so "sig" is good enough.
pub fn make_jwt(expires_at: DateTime<Utc>) -> String {
  let header = URL_SAFE_NO_PAD.encode(json!({ "alg": "HS256", "typ": "JWT" }).to_string());
  let payload = URL_SAFE_NO_PAD.encode(
    json!({ "id": "user-1", "exp": expires_at.timestamp() }).to_string(),
  );
  format!("{}.{}.sig", header, payload)
}

/// Scripted in-process transport.
///
/// Routes are keyed as "METHOD /path"; unscripted routes fail with a network
/// error so a missing script shows up as a test failure, not a hang. Every
/// request is logged for assertions on headers and bodies.
#[derive(Clone)]
pub struct FakeTransport {
  inner: Arc<FakeInner>,
}

struct FakeInner {
  routes: Mutex<HashMap<String, (u16, Value)>>,
  log: Mutex<Vec<HttpRequest>>,
  latency: Option<Duration>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(FakeInner {
        routes: Mutex::new(HashMap::new()),
        log: Mutex::new(Vec::new()),
        latency: None,
      }),
    }
  }

  /// Delay every response, so concurrent callers genuinely overlap.
  pub fn with_latency(self, latency: Duration) -> Self {
    Self {
      inner: Arc::new(FakeInner {
        routes: Mutex::new(self.inner.routes.lock().unwrap().clone()),
        log: Mutex::new(self.inner.log.lock().unwrap().clone()),
        latency: Some(latency),
      }),
    }
  }

  /// Script (or replace) the response for a route.
  pub fn respond(&self, route: &str, status: u16, body: Value) {
    self
      .inner
      .routes
      .lock()
      .unwrap()
      .insert(route.to_string(), (status, body));
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.inner.log.lock().unwrap().clone()
  }

  pub fn request_count(&self) -> usize {
    self.inner.log.lock().unwrap().len()
  }

  pub fn count_for(&self, route: &str) -> usize {
    self
      .inner
      .log
      .lock()
      .unwrap()
      .iter()
      .filter(|r| route_key(r) == route)
      .count()
  }

  /// The last request sent to a route, for header/body assertions.
  pub fn last_request_for(&self, route: &str) -> Option<HttpRequest> {
    self
      .inner
      .log
      .lock()
      .unwrap()
      .iter()
      .rev()
      .find(|r| route_key(r) == route)
      .cloned()
  }
}

fn route_key(request: &HttpRequest) -> String {
  let method = match request.method {
    Method::Get => "GET",
    Method::Post => "POST",
    Method::Patch => "PATCH",
    Method::Delete => "DELETE",
  };
  format!("{} {}", method, request.path)
}

impl Transport for FakeTransport {
  fn execute(&self, request: HttpRequest) -> BoxFuture<Result<HttpResponse>> {
    let inner = Arc::clone(&self.inner);

    Box::pin(async move {
      let key = route_key(&request);
      inner.log.lock().unwrap().push(request);

      if let Some(latency) = inner.latency {
        tokio::time::sleep(latency).await;
      }

      let scripted = inner.routes.lock().unwrap().get(&key).cloned();
      match scripted {
        Some((status, body)) => Ok(HttpResponse { status, body }),
        None => Err(Error::Network(format!("no scripted response for {}", key))),
      }
    })
  }
}
