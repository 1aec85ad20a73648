use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::outbox::SyncConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the layer fronts; everything else is passthrough
  pub origin: String,
  /// Name of the cache generation this deployment serves
  #[serde(default = "default_generation")]
  pub generation: String,
  /// Database location override (default: platform data dir)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub routes: RoutesConfig,
  #[serde(default)]
  pub sync: SyncSettings,
}

fn default_generation() -> String {
  "v1".to_string()
}

/// Route tables for the policy engine.
///
/// Patterns are exact paths, or prefixes when they end in `/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  /// Immutable application shell, precached at install time
  pub shell: Vec<String>,
  /// Paths that must never be served from cache
  pub always_fresh: Vec<String>,
  /// Read endpoints and assets served network-first with cache fallback
  pub network_first: Vec<String>,
  /// Navigation fallback page, always part of the shell
  pub offline_fallback: String,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      shell: vec![
        "/".to_string(),
        "/manifest.webmanifest".to_string(),
        "/icons/icon-192.png".to_string(),
        "/icons/icon-512.png".to_string(),
        "/offline".to_string(),
      ],
      always_fresh: vec![
        "/api/auth/".to_string(),
        "/api/contact".to_string(),
        "/api/inquiries".to_string(),
      ],
      network_first: vec!["/api/".to_string(), "/static/".to_string()],
      offline_fallback: "/offline".to_string(),
    }
  }
}

/// Coordinator settings in file-friendly units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
  pub tag: String,
  pub retry_ceiling: u32,
  pub backoff_min_secs: u64,
  pub backoff_max_secs: u64,
}

impl Default for SyncSettings {
  fn default() -> Self {
    Self {
      tag: "contact-form".to_string(),
      retry_ceiling: 5,
      backoff_min_secs: 5,
      backoff_max_secs: 300,
    }
  }
}

impl SyncSettings {
  pub fn to_sync_config(&self) -> SyncConfig {
    SyncConfig {
      tag: self.tag.clone(),
      retry_ceiling: self.retry_ceiling,
      backoff_min: Duration::from_secs(self.backoff_min_secs),
      backoff_max: Duration::from_secs(self.backoff_max_secs),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./outpost.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/outpost/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/outpost/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("outpost.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("outpost").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Parsed origin URL.
  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config: Config = serde_yaml::from_str("origin: https://example.com\n").unwrap();

    assert_eq!(config.generation, "v1");
    assert_eq!(config.sync.retry_ceiling, 5);
    assert!(config.routes.shell.contains(&"/".to_string()));
    assert_eq!(config.routes.offline_fallback, "/offline");
    assert!(config.origin_url().is_ok());
  }

  #[test]
  fn test_full_config_overrides() {
    let yaml = r#"
origin: https://cafe.example
generation: "2024-08-29.2"
routes:
  shell: ["/", "/offline"]
  always_fresh: ["/api/contact"]
  network_first: ["/api/"]
  offline_fallback: "/offline"
sync:
  tag: inquiry-form
  retry_ceiling: 3
  backoff_min_secs: 1
  backoff_max_secs: 60
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(config.generation, "2024-08-29.2");
    let sync = config.sync.to_sync_config();
    assert_eq!(sync.retry_ceiling, 3);
    assert_eq!(sync.backoff_min, Duration::from_secs(1));
    assert_eq!(sync.tag, "inquiry-form");
  }
}
