//! Layered configuration: config file, then `SCHEMATA_*` environment
//! variables, then command-line flags.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use schemata_client::ApiConfig;
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "~/.config/schemata/config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
  /// Base URL of the schema-manager service.
  #[serde(default = "default_url")]
  pub url:          String,
  /// Local SQLite file. When set, the HTTP service is not used.
  #[serde(default)]
  pub store_path:   Option<PathBuf>,
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
}

fn default_url() -> String { "http://localhost:8000".into() }

fn default_timeout() -> u64 { 30 }

impl Default for Settings {
  fn default() -> Self {
    Self {
      url:          default_url(),
      store_path:   None,
      timeout_secs: default_timeout(),
    }
  }
}

/// Flag values that take precedence over everything else.
#[derive(Debug, Default)]
pub struct Overrides {
  pub url:          Option<String>,
  pub store_path:   Option<PathBuf>,
  pub timeout_secs: Option<u64>,
}

impl Settings {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let path = expand_tilde(path);
    let settings = config::Config::builder()
      .add_source(config::File::from(path.as_path()).required(false))
      .add_source(config::Environment::with_prefix("SCHEMATA"))
      .build()
      .with_context(|| format!("failed to read config file {}", path.display()))?;
    settings
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn apply(mut self, overrides: Overrides) -> Self {
    if let Some(url) = overrides.url {
      self.url = url;
    }
    if let Some(path) = overrides.store_path {
      self.store_path = Some(path);
    }
    if let Some(secs) = overrides.timeout_secs {
      self.timeout_secs = secs;
    }
    self.store_path = self.store_path.as_deref().map(expand_tilde);
    self
  }

  pub fn api_config(&self) -> ApiConfig {
    ApiConfig {
      base_url: self.url.clone(),
      timeout:  Duration::from_secs(self.timeout_secs),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_is_not_an_error() {
    assert!(Settings::load(Path::new("/nonexistent/schemata.toml")).is_ok());
  }

  #[test]
  fn flags_win() {
    let s = Settings::default().apply(Overrides {
      url:          Some("http://schemas:9000".into()),
      store_path:   Some("/tmp/s.db".into()),
      timeout_secs: None,
    });
    assert_eq!(s.url, "http://schemas:9000");
    assert_eq!(s.store_path.as_deref(), Some(Path::new("/tmp/s.db")));
    assert_eq!(s.timeout_secs, 30);
    assert_eq!(s.api_config().timeout, Duration::from_secs(30));
  }

  #[test]
  fn tilde_paths() {
    assert_eq!(expand_tilde(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    }
  }
}
