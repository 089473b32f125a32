//! Keyed query cache with read-through fetch, optimistic local patches, and
//! prefix invalidation.
//!
//! The entry table is process-wide mutable state owned by this module alone;
//! nothing else writes cache entries directly. The table lock is a plain
//! `std::sync::Mutex` that is never held across an await point; concurrent
//! access is interleaved, not parallel. Per-fingerprint fetches are
//! coalesced: while one is in flight, further callers for the same
//! fingerprint attach to its outcome over a broadcast channel instead of
//! issuing a duplicate call.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::types::Page;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// Last fetch succeeded; payload is current.
  Idle,
  /// A fetch for this fingerprint is in flight.
  Fetching,
  /// Known outdated; refetched on next access, payload retained until then.
  Stale,
  /// Last fetch failed and there is no previous payload to fall back on.
  Error,
}

/// Fingerprint → last-known result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub payload: Option<Page>,
  pub status: EntryStatus,
  pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
  fn fresh(page: Page) -> Self {
    Self {
      payload: Some(page),
      status: EntryStatus::Idle,
      fetched_at: Some(Utc::now()),
    }
  }
}

type FetchOutcome = std::result::Result<Page, Error>;

struct Inner {
  entries: HashMap<String, CacheEntry>,
  in_flight: HashMap<String, broadcast::Sender<FetchOutcome>>,
}

pub struct QueryCache {
  inner: Mutex<Inner>,
  /// How long a successful result counts as fresh.
  stale_after: Duration,
}

impl QueryCache {
  pub fn new(stale_after: Duration) -> Self {
    Self {
      inner: Mutex::new(Inner {
        entries: HashMap::new(),
        in_flight: HashMap::new(),
      }),
      stale_after,
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
    self
      .inner
      .lock()
      .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))
  }

  fn is_fresh(&self, entry: &CacheEntry) -> bool {
    entry.status == EntryStatus::Idle
      && entry
        .fetched_at
        .map(|t| Utc::now() - t <= self.stale_after)
        .unwrap_or(false)
  }

  /// Read-through fetch.
  ///
  /// Fresh entry: returned without calling `loader`. Stale or missing:
  /// `loader` runs and its result replaces the payload. In-flight: attach
  /// to the existing fetch. A failed fetch leaves the previous payload
  /// untouched (stale-but-present beats empty) and surfaces the error.
  pub async fn fetch<F, Fut>(&self, key: &str, loader: F) -> Result<CacheEntry>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Page>>,
  {
    // Decide under the lock: hit, attach, or own the fetch.
    let mut rx = {
      let mut inner = self.lock()?;

      if let Some(entry) = inner.entries.get(key) {
        if self.is_fresh(entry) {
          tracing::debug!(fingerprint = %key, "cache hit");
          return Ok(entry.clone());
        }
      }

      if let Some(tx) = inner.in_flight.get(key) {
        tracing::debug!(fingerprint = %key, "attaching to in-flight fetch");
        Some(tx.subscribe())
      } else {
        let (tx, _) = broadcast::channel(1);
        inner.in_flight.insert(key.to_string(), tx);

        let entry = inner.entries.entry(key.to_string()).or_insert(CacheEntry {
          payload: None,
          status: EntryStatus::Fetching,
          fetched_at: None,
        });
        entry.status = EntryStatus::Fetching;
        None
      }
    };

    if let Some(rx) = rx.as_mut() {
      let outcome = rx
        .recv()
        .await
        .map_err(|_| Error::Network("in-flight fetch dropped".to_string()))?;
      return match outcome {
        Ok(page) => Ok(CacheEntry::fresh(page)),
        Err(e) => Err(e),
      };
    }

    // We own the fetch: run the loader with no lock held.
    tracing::debug!(fingerprint = %key, "cache miss, fetching");
    let outcome = loader().await;

    let mut inner = self.lock()?;
    let tx = inner.in_flight.remove(key);

    let result = match outcome {
      Ok(page) => {
        let entry = CacheEntry::fresh(page.clone());
        inner.entries.insert(key.to_string(), entry.clone());
        if let Some(tx) = tx {
          let _ = tx.send(Ok(page));
        }
        Ok(entry)
      }
      Err(e) => {
        // Keep whatever we had; mark it for refetch on next access.
        if let Some(entry) = inner.entries.get_mut(key) {
          entry.status = if entry.payload.is_some() {
            EntryStatus::Stale
          } else {
            EntryStatus::Error
          };
        }
        tracing::debug!(fingerprint = %key, error = %e, "fetch failed, previous payload retained");
        if let Some(tx) = tx {
          let _ = tx.send(Err(e.clone()));
        }
        Err(e)
      }
    };

    result
  }

  /// Apply a synchronous in-place patch to a cached payload, the
  /// optimistic-write primitive. No network, no status change. Returns
  /// whether a payload was there to patch.
  pub fn set_local<F>(&self, key: &str, transform: F) -> Result<bool>
  where
    F: FnOnce(&mut Page),
  {
    let mut inner = self.lock()?;
    match inner.entries.get_mut(key).and_then(|e| e.payload.as_mut()) {
      Some(page) => {
        transform(page);
        tracing::debug!(fingerprint = %key, "local patch applied");
        Ok(true)
      }
      None => Ok(false),
    }
  }

  /// Snapshot the current entry for a fingerprint.
  pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
    Ok(self.lock()?.entries.get(key).cloned())
  }

  /// Mark every entry whose fingerprint satisfies `predicate` as stale.
  /// Stale entries keep their payload and are refetched on next access,
  /// never evicted eagerly. In-flight entries are left alone; their result
  /// lands regardless (last write wins).
  pub fn invalidate<P>(&self, predicate: P) -> Result<usize>
  where
    P: Fn(&str) -> bool,
  {
    let mut inner = self.lock()?;
    let mut marked = 0;
    for (key, entry) in inner.entries.iter_mut() {
      if entry.status != EntryStatus::Fetching && predicate(key) {
        entry.status = EntryStatus::Stale;
        marked += 1;
      }
    }
    tracing::debug!(marked, "cache invalidation");
    Ok(marked)
  }

  /// Invalidate every query on a resource: one mutation stales all
  /// paginated/sorted/filtered views of it without the cache knowing
  /// anything about query semantics.
  pub fn invalidate_prefix(&self, prefix: &str) -> Result<usize> {
    self.invalidate(|key| key.starts_with(prefix))
  }

  /// Drop everything (session teardown).
  pub fn clear(&self) -> Result<()> {
    let mut inner = self.lock()?;
    inner.entries.clear();
    inner.in_flight.clear();
    Ok(())
  }
}
