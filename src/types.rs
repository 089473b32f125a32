//! Wire and domain types for the Chirp API.
//!
//! List endpoints return a `{info, items}` envelope. The cache keeps items as
//! raw `serde_json::Value` records (it is type-agnostic, like the query cache
//! it models); the typed structs here are deserialized at the session edge.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pagination metadata returned alongside every list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageInfo {
  pub page: u32,
  pub limit: u32,
  /// Total matching records on the server.
  pub total: u64,
}

/// One page of records as cached: pagination metadata plus raw items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
  #[serde(default)]
  pub info: PageInfo,
  #[serde(default)]
  pub items: Vec<Value>,
}

impl Page {
  /// Wrap a single record as a one-item page (used for `profile`).
  pub fn single(item: Value) -> Self {
    Self {
      info: PageInfo {
        page: 1,
        limit: 1,
        total: 1,
      },
      items: vec![item],
    }
  }

  /// Deserialize the items into a typed record list, skipping nothing:
  /// a malformed record fails the whole page rather than vanishing silently.
  pub fn decode_items<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<Vec<T>> {
    self
      .items
      .iter()
      .map(|v| serde_json::from_value(v.clone()).map_err(|e| crate::error::Error::Decode(e.to_string())))
      .collect()
  }
}

/// Extract the `id` field of a raw record, if present.
pub fn record_id(record: &Value) -> Option<&str> {
  record.get("id").and_then(Value::as_str)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
  pub id: String,
  pub text: String,
  #[serde(default)]
  pub likes: Vec<String>,
  #[serde(rename = "postedBy")]
  pub posted_by: Value,
  #[serde(default)]
  pub pinned: bool,
  #[serde(rename = "createdAt")]
  pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub name: String,
  pub email: Option<String>,
  #[serde(default)]
  pub followers: Vec<String>,
  #[serde(default)]
  pub following: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub id: String,
  #[serde(rename = "notificationType")]
  pub notification_type: String,
  #[serde(default)]
  pub opened: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
  pub id: String,
  #[serde(default)]
  pub users: Vec<Value>,
  #[serde(rename = "latestMessage")]
  pub latest_message: Option<Value>,
}

/// Body of a successful login or token renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
  pub ac_token: String,
  #[serde(default)]
  pub user: Option<Value>,
}
