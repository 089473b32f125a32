use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default safety margin: a token expiring within this window is renewed
/// before the request that noticed it goes out.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 30;

/// Default staleness horizon for cached list results.
const DEFAULT_STALE_AFTER_SECS: i64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the Chirp API server, e.g. "http://localhost:8888".
  pub base_url: String,
  /// Seconds before expiry at which a token counts as expiring.
  #[serde(default = "default_refresh_margin")]
  pub refresh_margin_secs: i64,
  /// Seconds after which a cached list is considered stale.
  #[serde(default = "default_stale_after")]
  pub stale_after_secs: i64,
  /// Where the bearer token is persisted between runs.
  /// Defaults to `<data dir>/chirp/token`.
  pub token_path: Option<PathBuf>,
}

fn default_refresh_margin() -> i64 {
  DEFAULT_REFRESH_MARGIN_SECS
}

fn default_stale_after() -> i64 {
  DEFAULT_STALE_AFTER_SECS
}

impl Config {
  /// Build a config with defaults for everything but the server address.
  pub fn for_base_url(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into(),
      refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
      stale_after_secs: DEFAULT_STALE_AFTER_SECS,
      token_path: None,
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./chirp.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/chirp/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Internal(format!(
          "config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(Error::Internal(
        "no configuration file found; create one at ~/.config/chirp/config.yaml".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("chirp.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("chirp").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::Internal(format!("failed to read config file {}: {}", path.display(), e))
    })?;

    let mut config: Config = serde_yaml::from_str(&contents).map_err(|e| {
      Error::Decode(format!("failed to parse config file {}: {}", path.display(), e))
    })?;

    // Environment overrides the file for the server address
    if let Ok(base_url) = std::env::var("CHIRP_BASE_URL") {
      config.base_url = base_url;
    }

    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.base_url)
      .map_err(|e| Error::Decode(format!("invalid base_url {}: {}", self.base_url, e)))?;
    Ok(())
  }

  pub fn refresh_margin(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.refresh_margin_secs)
  }

  pub fn stale_after(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.stale_after_secs)
  }
}
