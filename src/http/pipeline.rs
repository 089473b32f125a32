//! Request pipeline: every outbound call goes through here.
//!
//! Before dispatch a valid credential is attached (renewing if needed, see
//! `auth::manager`); after dispatch the JSON body is unwrapped and non-2xx
//! statuses are mapped to the typed error taxonomy. Callers never see
//! transport-level types. No retries: the single renewal coalescing upstream
//! is the only second chance anything gets.

use serde_json::Value;
use std::sync::Arc;

use crate::auth::manager::TokenManager;
use crate::error::{Error, Result};
use crate::http::transport::{HttpRequest, Transport};

pub struct RequestPipeline {
  transport: Arc<dyn Transport>,
  tokens: Arc<TokenManager>,
}

impl RequestPipeline {
  pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenManager>) -> Self {
    Self { transport, tokens }
  }

  /// Dispatch a request and return the unwrapped JSON body.
  pub async fn send(&self, mut request: HttpRequest) -> Result<Value> {
    if !request.anonymous {
      let credential = self.tokens.ensure_valid().await?;
      request.bearer = Some(credential.bearer());
    }

    tracing::debug!(path = %request.path, method = ?request.method, "dispatching request");

    let response = self.transport.execute(request).await?;

    if response.is_success() {
      return Ok(response.body);
    }

    let message = server_message(&response.body);
    tracing::debug!(status = response.status, message = %message, "server rejected request");
    Err(Error::from_status(response.status, message))
  }
}

/// Pull the human-readable message out of an error body, falling back to the
/// raw body so nothing is swallowed.
fn server_message(body: &Value) -> String {
  body
    .get("message")
    .and_then(Value::as_str)
    .map(str::to_string)
    .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::store::MemoryStore;
  use crate::testutil::{make_jwt, FakeTransport};
  use chrono::{Duration, Utc};
  use serde_json::json;

  fn pipeline_with(transport: FakeTransport, token: Option<String>) -> RequestPipeline {
    let tokens = Arc::new(TokenManager::new(
      Arc::new(MemoryStore::new(token)),
      Arc::new(transport.clone()),
      Duration::seconds(30),
    ));
    RequestPipeline::new(Arc::new(transport), tokens)
  }

  #[tokio::test]
  async fn attaches_bearer_token() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let transport = FakeTransport::new();
    transport.respond("GET /posts", 200, json!({ "info": {}, "items": [] }));

    let pipeline = pipeline_with(transport.clone(), Some(token.clone()));
    pipeline.send(HttpRequest::get("/posts")).await.unwrap();

    let sent = transport.last_request_for("GET /posts").unwrap();
    assert_eq!(sent.bearer, Some(format!("Bearer {}", token)));
  }

  #[tokio::test]
  async fn anonymous_request_skips_token_entirely() {
    let transport = FakeTransport::new();
    transport.respond("POST /auth/login", 200, json!({ "ac_token": "t" }));

    // No stored token: a non-anonymous request would try to renew.
    let pipeline = pipeline_with(transport.clone(), None);
    pipeline
      .send(HttpRequest::post("/auth/login").anonymous())
      .await
      .unwrap();

    let sent = transport.last_request_for("POST /auth/login").unwrap();
    assert_eq!(sent.bearer, None);
    // Only the login call went out; no refresh attempt
    assert_eq!(transport.request_count(), 1);
  }

  #[tokio::test]
  async fn unwraps_body_on_success() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let transport = FakeTransport::new();
    transport.respond("GET /profile", 200, json!({ "id": "u1", "name": "ann" }));

    let pipeline = pipeline_with(transport, Some(token));
    let body = pipeline.send(HttpRequest::get("/profile")).await.unwrap();
    assert_eq!(body["name"], "ann");
  }

  #[tokio::test]
  async fn maps_server_errors_to_taxonomy() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let transport = FakeTransport::new();
    transport.respond("GET /posts/p9", 404, json!({ "message": "post not found" }));
    transport.respond("POST /posts", 422, json!({ "message": "text required" }));

    let pipeline = pipeline_with(transport, Some(token));

    assert_eq!(
      pipeline.send(HttpRequest::get("/posts/p9")).await.unwrap_err(),
      Error::NotFound {
        message: "post not found".to_string()
      }
    );
    assert_eq!(
      pipeline.send(HttpRequest::post("/posts")).await.unwrap_err(),
      Error::ValidationRejected {
        status: 422,
        message: "text required".to_string()
      }
    );
  }

  #[tokio::test]
  async fn network_failures_propagate_untouched() {
    let token = make_jwt(Utc::now() + Duration::hours(1));
    let pipeline = pipeline_with(FakeTransport::new(), Some(token));

    // Unscripted route: the fake fails with a network error
    let err = pipeline.send(HttpRequest::get("/posts")).await.unwrap_err();
    assert!(matches!(err, Error::Network(_)));
  }
}
