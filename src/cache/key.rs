//! Deterministic query fingerprints.
//!
//! A fingerprint uniquely identifies one logical query: resource name,
//! pagination, sort order, optional search term. Two logically identical
//! queries always render the same string, which serves both as the cache key
//! and as the prefix that invalidation matches on, so the fingerprint is a
//! readable string, never a hash.

use std::fmt;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const DEFAULT_SORT: &str = "-createdAt";

/// One logical list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
  resource: String,
  page: u32,
  limit: u32,
  sort: String,
  search: Option<String>,
}

impl QueryKey {
  /// A paginated list query with default page/limit/sort.
  pub fn list(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      page: DEFAULT_PAGE,
      limit: DEFAULT_LIMIT,
      sort: DEFAULT_SORT.to_string(),
      search: None,
    }
  }

  pub fn page(mut self, page: u32) -> Self {
    self.page = page;
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = limit;
    self
  }

  pub fn sort(mut self, sort: impl Into<String>) -> Self {
    self.sort = sort.into();
    self
  }

  /// An empty search term is the same query as no search term.
  pub fn search(mut self, search: impl Into<String>) -> Self {
    let search = search.into();
    self.search = if search.is_empty() { None } else { Some(search) };
    self
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  /// Render the cache key, e.g.
  /// `posts?page=2&limit=10&sort=-createdAt&search=rust`.
  pub fn fingerprint(&self) -> String {
    let mut key = format!(
      "{}?page={}&limit={}&sort={}",
      self.resource, self.page, self.limit, self.sort
    );
    if let Some(search) = &self.search {
      key.push_str("&search=");
      key.push_str(search);
    }
    key
  }

  /// The query parameters as sent to the server.
  pub fn params(&self) -> Vec<(String, String)> {
    let mut params = vec![
      ("page".to_string(), self.page.to_string()),
      ("limit".to_string(), self.limit.to_string()),
      ("sort".to_string(), self.sort.clone()),
    ];
    if let Some(search) = &self.search {
      params.push(("search".to_string(), search.clone()));
    }
    params
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.fingerprint())
  }
}
