//! Session context: the one owner of credential, cache, and pipeline state.
//!
//! Constructed once at session start, torn down on logout. There are no
//! ambient singletons: everything the data layer mutates lives here and is
//! reached through this struct. The typed operations mirror the server's
//! REST surface: paginated lists, post creation, and the like/follow
//! membership toggles.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::auth::manager::TokenManager;
use crate::auth::store::{FileStore, TokenStore};
use crate::cache::key::QueryKey;
use crate::cache::store::QueryCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::pipeline::RequestPipeline;
use crate::http::transport::{HttpRequest, ReqwestTransport, Transport};
use crate::toggle::{MembershipField, ToggleEngine};
use crate::types::{Chat, LoginResponse, Notification, Page, Post, User};

pub struct Session {
  tokens: Arc<TokenManager>,
  pipeline: Arc<RequestPipeline>,
  cache: Arc<QueryCache>,
  toggles: ToggleEngine,
  /// Identity of the logged-in user; the toggles need it.
  user_id: Mutex<Option<String>>,
}

impl Session {
  /// Build a session against the real network and the on-disk token store.
  pub fn new(config: &Config) -> Result<Self> {
    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config)?);
    let store: Arc<dyn TokenStore> = match &config.token_path {
      Some(path) => Arc::new(FileStore::new(path.clone())),
      None => Arc::new(FileStore::open_default()?),
    };
    Ok(Self::with_parts(config, transport, store))
  }

  /// Build a session with injected transport and token store.
  pub fn with_parts(
    config: &Config,
    transport: Arc<dyn Transport>,
    store: Arc<dyn TokenStore>,
  ) -> Self {
    let tokens = Arc::new(TokenManager::new(
      store,
      Arc::clone(&transport),
      config.refresh_margin(),
    ));
    let pipeline = Arc::new(RequestPipeline::new(transport, Arc::clone(&tokens)));
    let cache = Arc::new(QueryCache::new(config.stale_after()));
    let toggles = ToggleEngine::new(Arc::clone(&cache));

    Self {
      tokens,
      pipeline,
      cache,
      toggles,
      user_id: Mutex::new(None),
    }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Route a call through the pipeline, tearing the session down if the
  /// credential could not be renewed. An auth failure is the one error that
  /// wipes state wholesale; everything else stays local to the caller.
  async fn call(&self, request: HttpRequest) -> Result<Value> {
    match self.pipeline.send(request).await {
      Err(Error::AuthExpired) => {
        self.teardown().await;
        Err(Error::AuthExpired)
      }
      other => other,
    }
  }

  async fn teardown(&self) {
    let _ = self.tokens.clear().await;
    let _ = self.cache.clear();
    if let Ok(mut user_id) = self.user_id.lock() {
      *user_id = None;
    }
    tracing::debug!("session torn down");
  }

  /// Authenticate and install the returned credential. The server also sets
  /// the long-lived refresh cookie on this response.
  pub async fn login(&self, email: &str, password: &str) -> Result<Option<Value>> {
    let body = self
      .call(
        HttpRequest::post("/auth/login")
          .anonymous()
          .with_body(json!({ "email": email, "password": password })),
      )
      .await?;

    let response: LoginResponse = serde_json::from_value(body)
      .map_err(|e| Error::Decode(format!("malformed login response: {}", e)))?;

    self.tokens.install(&response.ac_token).await?;

    if let Some(id) = response
      .user
      .as_ref()
      .and_then(|u| u.get("id"))
      .and_then(Value::as_str)
    {
      if let Ok(mut user_id) = self.user_id.lock() {
        *user_id = Some(id.to_string());
      }
    }

    tracing::debug!("logged in");
    Ok(response.user)
  }

  /// End the session: best-effort server notification, then local teardown.
  pub async fn logout(&self) -> Result<()> {
    let _ = self.call(HttpRequest::post("/auth/logout")).await;
    self.teardown().await;
    Ok(())
  }

  /// The logged-in user's id, required for membership toggles.
  fn identity(&self) -> Result<String> {
    self
      .user_id
      .lock()
      .ok()
      .and_then(|id| id.clone())
      .ok_or(Error::AuthExpired)
  }

  /// Read-through fetch of one paginated list (posts, users, notifications,
  /// chats; the resource comes from the key).
  pub async fn list(&self, key: &QueryKey) -> Result<Page> {
    let fingerprint = key.fingerprint();
    let path = format!("/{}", key.resource());
    let params = key.params();

    let entry = self
      .cache
      .fetch(&fingerprint, || async {
        let body = self
          .call(HttpRequest::get(path).with_query(params))
          .await?;
        serde_json::from_value(body)
          .map_err(|e| Error::Decode(format!("malformed list response: {}", e)))
      })
      .await?;

    entry
      .payload
      .ok_or_else(|| Error::Decode("fetched entry has no payload".to_string()))
  }

  pub async fn posts(&self, key: &QueryKey) -> Result<Vec<Post>> {
    self.list(key).await?.decode_items()
  }

  /// The logged-in user's own posts; lives under the `posts` prefix so a
  /// post creation invalidates it too.
  pub async fn my_posts(&self, key: &QueryKey) -> Result<Vec<Post>> {
    self.list(key).await?.decode_items()
  }

  pub async fn users(&self, key: &QueryKey) -> Result<Vec<User>> {
    self.list(key).await?.decode_items()
  }

  /// Poll-style reads; callers invoke these on a timer for badge counts.
  pub async fn notifications(&self, key: &QueryKey) -> Result<Vec<Notification>> {
    self.list(key).await?.decode_items()
  }

  pub async fn chats(&self, key: &QueryKey) -> Result<Vec<Chat>> {
    self.list(key).await?.decode_items()
  }

  /// The logged-in user's profile, cached under its own fingerprint.
  pub async fn profile(&self) -> Result<User> {
    let entry = self
      .cache
      .fetch("profile", || async {
        let body = self.call(HttpRequest::get("/profile")).await?;
        Ok(Page::single(body))
      })
      .await?;

    let record = entry
      .payload
      .and_then(|p| p.items.into_iter().next())
      .ok_or_else(|| Error::Decode("profile entry has no payload".to_string()))?;
    serde_json::from_value(record)
      .map_err(|e| Error::Decode(format!("malformed profile response: {}", e)))
  }

  /// Create a post, then stale every cached posts view: whatever its
  /// pagination, sort, or search, it no longer reflects the server.
  pub async fn create_post(&self, text: &str, image: Option<Value>) -> Result<Value> {
    let mut body = json!({ "text": text });
    if let Some(image) = image {
      body["image"] = image;
    }

    let created = self.call(HttpRequest::post("/posts").with_body(body)).await;
    // Invalidate on settle, success or not: a rejected create may still
    // have observable server-side effects worth refetching.
    self.cache.invalidate_prefix("posts")?;
    created
  }

  /// Like or unlike a post, optimistically, against the cached view `key`.
  pub async fn toggle_like(&self, key: &QueryKey, post_id: &str) -> Result<bool> {
    let identity = self.identity()?;
    let path = format!("/posts/{}/like", post_id);

    self
      .toggles
      .toggle_membership(
        &key.fingerprint(),
        post_id,
        MembershipField::Likes,
        &identity,
        || async { self.call(HttpRequest::patch(path)).await },
      )
      .await
  }

  /// Follow or unfollow a user, optimistically, against the cached view.
  pub async fn toggle_follow(&self, key: &QueryKey, target_user_id: &str) -> Result<bool> {
    let identity = self.identity()?;
    let path = format!("/users/{}/follow", target_user_id);

    self
      .toggles
      .toggle_membership(
        &key.fingerprint(),
        target_user_id,
        MembershipField::Followers,
        &identity,
        || async { self.call(HttpRequest::patch(path)).await },
      )
      .await
  }
}
