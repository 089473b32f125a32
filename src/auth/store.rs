//! Persistent token slot.
//!
//! One opaque string: read at session start, written on login/renewal,
//! cleared on logout. The trait keeps the token manager testable without
//! touching the filesystem.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// Storage backends for the bearer token.
pub trait TokenStore: Send + Sync {
  fn load(&self) -> Result<Option<String>>;
  fn save(&self, token: &str) -> Result<()>;
  fn clear(&self) -> Result<()>;
}

/// File-backed store under the user data directory.
pub struct FileStore {
  path: PathBuf,
}

impl FileStore {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// Create a store at the default location (`<data dir>/chirp/token`).
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| Error::Internal("could not determine data directory".to_string()))?;

    Ok(Self::new(data_dir.join("chirp").join("token")))
  }
}

impl TokenStore for FileStore {
  fn load(&self) -> Result<Option<String>> {
    match std::fs::read_to_string(&self.path) {
      Ok(contents) => {
        let token = contents.trim().to_string();
        Ok(if token.is_empty() { None } else { Some(token) })
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(Error::Internal(format!(
        "failed to read token at {}: {}",
        self.path.display(),
        e
      ))),
    }
  }

  fn save(&self, token: &str) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Internal(format!("failed to create token directory: {}", e)))?;
    }

    std::fs::write(&self.path, token).map_err(|e| {
      Error::Internal(format!(
        "failed to write token at {}: {}",
        self.path.display(),
        e
      ))
    })
  }

  fn clear(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(Error::Internal(format!("failed to clear token: {}", e))),
    }
  }
}

/// In-memory store, used by tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryStore {
  token: Mutex<Option<String>>,
}

impl MemoryStore {
  pub fn new(initial: Option<String>) -> Self {
    Self {
      token: Mutex::new(initial),
    }
  }
}

impl TokenStore for MemoryStore {
  fn load(&self) -> Result<Option<String>> {
    let slot = self
      .token
      .lock()
      .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
    Ok(slot.clone())
  }

  fn save(&self, token: &str) -> Result<()> {
    let mut slot = self
      .token
      .lock()
      .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
    *slot = Some(token.to_string());
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let mut slot = self
      .token
      .lock()
      .map_err(|e| Error::Internal(format!("lock poisoned: {}", e)))?;
    *slot = None;
    Ok(())
  }
}
