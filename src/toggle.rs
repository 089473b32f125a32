//! Optimistic set-membership toggles (like, follow) against the query cache.
//!
//! One reusable primitive parameterized by (fingerprint, resource id, field,
//! identity): like/unlike and follow/unfollow are the same operation on
//! different fields. The optimistic patch is applied synchronously before
//! the remote call goes out, so the action is visible immediately; if the
//! server rejects it, the patch is undone against whatever the cache holds
//! *then*, so unrelated concurrent updates survive the rollback.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::cache::store::QueryCache;
use crate::error::Result;
use crate::types::record_id;

/// The set-valued fields a toggle can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipField {
  Likes,
  Followers,
  Following,
}

impl MembershipField {
  pub fn as_str(&self) -> &'static str {
    match self {
      MembershipField::Likes => "likes",
      MembershipField::Followers => "followers",
      MembershipField::Following => "following",
    }
  }
}

/// What the optimistic apply did, recorded so the rollback can invert it.
/// Blindly re-toggling on rollback would re-add the identity if a concurrent
/// fetch had already landed without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleOp {
  Added,
  Removed,
}

pub struct ToggleEngine {
  cache: Arc<QueryCache>,
}

impl ToggleEngine {
  pub fn new(cache: Arc<QueryCache>) -> Self {
    Self { cache }
  }

  /// Toggle `identity`'s membership in `field` of the record `resource_id`
  /// under the cached entry for `key`, confirming through `remote`.
  ///
  /// Returns whether the identity is a member after the toggle settles. On
  /// failure the optimistic patch has already been rolled back before the
  /// error is returned; rollback itself never fails the caller.
  pub async fn toggle_membership<F, Fut>(
    &self,
    key: &str,
    resource_id: &str,
    field: MembershipField,
    identity: &str,
    remote: F,
  ) -> Result<bool>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    // Idle -> Applied: patch the cache before the network call.
    let mut op = None;
    self.cache.set_local(key, |page| {
      op = toggle_in(&mut page.items, resource_id, field, identity);
    })?;

    if let Some(op) = op {
      tracing::debug!(
        fingerprint = %key,
        resource = %resource_id,
        field = field.as_str(),
        ?op,
        "optimistic toggle applied"
      );
    }

    match remote().await {
      Ok(record) => {
        // Applied -> Confirmed: the optimistic value already matches the
        // intended end state. Prefer the server's word on membership when
        // the updated record carries the field.
        let member = record
          .get(field.as_str())
          .and_then(Value::as_array)
          .map(|set| set.iter().any(|v| v.as_str() == Some(identity)))
          .unwrap_or(op == Some(ToggleOp::Added));
        Ok(member)
      }
      Err(e) => {
        // Applied -> RolledBack: invert the recorded operation against the
        // *current* payload. If the record or entry vanished in the
        // meantime, this is a no-op and the next fetch reconciles.
        if let Some(op) = op {
          let _ = self.cache.set_local(key, |page| {
            undo_in(&mut page.items, resource_id, field, identity, op);
          });
          tracing::debug!(fingerprint = %key, resource = %resource_id, "optimistic toggle rolled back");
        }
        Err(e)
      }
    }
  }
}

/// Toggle presence of `identity` in the record's membership set. Returns
/// what was done, or `None` if the record is not in this page.
fn toggle_in(
  items: &mut [Value],
  resource_id: &str,
  field: MembershipField,
  identity: &str,
) -> Option<ToggleOp> {
  let record = items.iter_mut().find(|r| record_id(r) == Some(resource_id))?;
  let set = membership_set(record, field)?;

  if set.iter().any(|v| v.as_str() == Some(identity)) {
    set.retain(|v| v.as_str() != Some(identity));
    Some(ToggleOp::Removed)
  } else {
    set.push(Value::String(identity.to_string()));
    Some(ToggleOp::Added)
  }
}

/// Invert a recorded toggle, idempotently: removing an absent identity or
/// re-adding a present one changes nothing.
fn undo_in(
  items: &mut [Value],
  resource_id: &str,
  field: MembershipField,
  identity: &str,
  op: ToggleOp,
) {
  let Some(record) = items.iter_mut().find(|r| record_id(r) == Some(resource_id)) else {
    return;
  };
  let Some(set) = membership_set(record, field) else {
    return;
  };

  match op {
    ToggleOp::Added => set.retain(|v| v.as_str() != Some(identity)),
    ToggleOp::Removed => {
      if !set.iter().any(|v| v.as_str() == Some(identity)) {
        set.push(Value::String(identity.to_string()));
      }
    }
  }
}

/// The membership array on a record, created empty if missing.
fn membership_set<'a>(record: &'a mut Value, field: MembershipField) -> Option<&'a mut Vec<Value>> {
  let map = record.as_object_mut()?;
  map
    .entry(field.as_str())
    .or_insert_with(|| Value::Array(Vec::new()))
    .as_array_mut()
}
