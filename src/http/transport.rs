//! HTTP transport seam.
//!
//! The pipeline talks to the network through the `Transport` trait so tests
//! can run against a scripted in-process fake. The real implementation wraps
//! `reqwest` with a cookie jar: the long-lived refresh proof is a cookie set
//! by the server at login, and it must ride along on `/auth/refresh`.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// A boxed future, the dyn-friendly shape for trait-object async methods.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

/// One outbound request, transport-agnostic.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  /// Path relative to the base URL, e.g. "/posts".
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
  /// `Authorization` header value, filled in by the pipeline.
  pub bearer: Option<String>,
  /// Anonymous requests (login, refresh) skip token attachment entirely;
  /// the renewal call itself must never recurse into renewal.
  pub anonymous: bool,
}

impl HttpRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self::new(Method::Get, path)
  }

  pub fn post(path: impl Into<String>) -> Self {
    Self::new(Method::Post, path)
  }

  pub fn patch(path: impl Into<String>) -> Self {
    Self::new(Method::Patch, path)
  }

  fn new(method: Method, path: impl Into<String>) -> Self {
    Self {
      method,
      path: path.into(),
      query: Vec::new(),
      body: None,
      bearer: None,
      anonymous: false,
    }
  }

  /// Mark this request as carrying no authorization.
  pub fn anonymous(mut self) -> Self {
    self.anonymous = true;
    self
  }

  pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
    self.query = query;
    self
  }

  pub fn with_body(mut self, body: Value) -> Self {
    self.body = Some(body);
    self
  }
}

/// Status and parsed JSON body of a response. Transport-level errors
/// (connection refused, timeout) never make it here; they surface as
/// `Error::Network` instead.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Value,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Transport backends. Boxed-future methods keep the trait object-safe so
/// the manager and pipeline can share one `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
  fn execute(&self, request: HttpRequest) -> BoxFuture<Result<HttpResponse>>;
}

/// Production transport over `reqwest`.
pub struct ReqwestTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl ReqwestTransport {
  pub fn new(config: &Config) -> Result<Self> {
    let mut base_url = Url::parse(&config.base_url)
      .map_err(|e| Error::Decode(format!("invalid base_url {}: {}", config.base_url, e)))?;

    // Joining resolves relative to the last path segment, so a base of
    // "http://host/api" would swallow "api". Keep the path in directory form.
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let client = reqwest::Client::builder()
      .cookie_store(true)
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| Error::Network(format!("failed to build http client: {}", e)))?;

    Ok(Self { client, base_url })
  }
}

impl Transport for ReqwestTransport {
  fn execute(&self, request: HttpRequest) -> BoxFuture<Result<HttpResponse>> {
    let client = self.client.clone();
    let url = self.base_url.join(request.path.trim_start_matches('/'));

    Box::pin(async move {
      let url = url.map_err(|e| Error::Decode(format!("invalid request path: {}", e)))?;

      let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
      };

      let mut builder = client.request(method, url).query(&request.query);

      if let Some(bearer) = &request.bearer {
        builder = builder.header(reqwest::header::AUTHORIZATION, bearer);
      }

      if let Some(body) = &request.body {
        builder = builder.json(body);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

      let status = response.status().as_u16();
      let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

      // Empty bodies (204, some error pages) decode as null
      let body = if bytes.is_empty() {
        Value::Null
      } else {
        serde_json::from_slice(&bytes)
          .map_err(|e| Error::Decode(format!("response body is not JSON: {}", e)))?
      };

      Ok(HttpResponse { status, body })
    })
  }
}
