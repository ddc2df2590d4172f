//! Stack configuration.
//!
//! Values come from a per-stack YAML file and from `key=value` overrides:
//!
//! ```yaml
//! config:
//!   services:frontendPort: 3001
//!   mongoHost: mongodb://mongo:27017
//! ```
//!
//! Keys may be namespaced with the project name. A lookup for `key` tries
//! `<project>:key` first, then the bare `key`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

/// Errors from loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("missing required configuration value '{key}'")]
  Missing { key: String },

  #[error("configuration value '{key}' is not a number: {value}")]
  InvalidNumber { key: String, value: String },

  #[error("configuration value '{key}' is not a boolean: {value}")]
  InvalidBool { key: String, value: String },

  #[error("invalid configuration override '{0}': expected key=value")]
  InvalidOverride(String),

  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  config: BTreeMap<String, Value>,
}

/// Key/value configuration for one stack.
#[derive(Debug, Clone, Default)]
pub struct Config {
  project: String,
  values: BTreeMap<String, Value>,
}

impl Config {
  pub fn new(project: impl Into<String>) -> Self {
    Self {
      project: project.into(),
      values: BTreeMap::new(),
    }
  }

  /// Load the `config:` map of a YAML file.
  pub fn from_file(project: impl Into<String>, path: &Path) -> Result<Self, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::from_yaml(project, &content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    config.values.retain(|_, v| !v.is_null());
    debug!(path = %path.display(), keys = config.values.len(), "loaded config file");
    Ok(config)
  }

  /// Load from `path` if it exists, otherwise start empty.
  pub fn load_optional(project: impl Into<String>, path: &Path) -> Result<Self, ConfigError> {
    if path.exists() {
      Self::from_file(project, path)
    } else {
      debug!(path = %path.display(), "no config file");
      Ok(Self::new(project))
    }
  }

  fn from_yaml(project: impl Into<String>, content: &str) -> Result<Self, serde_yaml::Error> {
    // An empty document deserializes as unit, not as an empty map.
    let file: ConfigFile = if content.trim().is_empty() {
      ConfigFile::default()
    } else {
      serde_yaml::from_str(content)?
    };
    Ok(Self {
      project: project.into(),
      values: file.config,
    })
  }

  pub fn project(&self) -> &str {
    &self.project
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.values.insert(key.into(), value.into());
  }

  /// Apply a `key=value` override. The value is stored as a string; numeric
  /// lookups parse it.
  pub fn set_override(&mut self, entry: &str) -> Result<(), ConfigError> {
    match entry.split_once('=') {
      Some((key, value)) if !key.trim().is_empty() => {
        self.set(key.trim(), value);
        Ok(())
      }
      _ => Err(ConfigError::InvalidOverride(entry.to_string())),
    }
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    let namespaced = format!("{}:{}", self.project, key);
    self.values.get(&namespaced).or_else(|| self.values.get(key))
  }

  pub fn require(&self, key: &str) -> Result<&Value, ConfigError> {
    self.get(key).ok_or_else(|| ConfigError::Missing { key: key.to_string() })
  }

  /// A required value rendered as a string.
  pub fn require_str(&self, key: &str) -> Result<String, ConfigError> {
    self.require(key).map(ToString::to_string)
  }

  pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ConfigError> {
    self.get(key).map(|value| number(key, value)).transpose()
  }

  pub fn require_f64(&self, key: &str) -> Result<f64, ConfigError> {
    number(key, self.require(key)?)
  }

  pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
    self.get(key).map(|value| boolean(key, value)).transpose()
  }

  pub fn require_bool(&self, key: &str) -> Result<bool, ConfigError> {
    boolean(key, self.require(key)?)
  }
}

fn number(key: &str, value: &Value) -> Result<f64, ConfigError> {
  value.as_f64().ok_or_else(|| ConfigError::InvalidNumber {
    key: key.to_string(),
    value: value.to_string(),
  })
}

fn boolean(key: &str, value: &Value) -> Result<bool, ConfigError> {
  value.as_bool().ok_or_else(|| ConfigError::InvalidBool {
    key: key.to_string(),
    value: value.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  const SERVICES_YAML: &str = r#"
config:
  services:frontendPort: 3001
  backendPort: "3000"
  mongoHost: mongodb://mongo:27017
  debug: true
"#;

  #[test]
  fn namespaced_key_wins_over_bare_key() {
    let mut config = Config::from_yaml("services", SERVICES_YAML).unwrap();
    config.set("frontendPort", 8080.0);
    assert_eq!(config.require_f64("frontendPort").unwrap(), 3001.0);
  }

  #[test]
  fn numbers_accept_numeric_strings() {
    let config = Config::from_yaml("services", SERVICES_YAML).unwrap();
    assert_eq!(config.require_f64("backendPort").unwrap(), 3000.0);
    assert!(matches!(
      config.require_f64("mongoHost"),
      Err(ConfigError::InvalidNumber { ref key, .. }) if key == "mongoHost"
    ));
    assert_eq!(config.get_f64("absent").unwrap(), None);
  }

  #[test]
  fn missing_required_key() {
    let config = Config::new("services");
    let err = config.require("org").unwrap_err();
    assert_eq!(err.to_string(), "missing required configuration value 'org'");
  }

  #[test]
  fn overrides_layer_over_file() {
    let mut config = Config::from_yaml("services", SERVICES_YAML).unwrap();
    config.set_override("mongoHost=mongodb://db:27017").unwrap();
    config.set_override("org=acme").unwrap();
    assert_eq!(config.require_str("mongoHost").unwrap(), "mongodb://db:27017");
    assert_eq!(config.require_str("org").unwrap(), "acme");
    assert!(matches!(
      config.set_override("no-equals"),
      Err(ConfigError::InvalidOverride(_))
    ));
    assert!(matches!(config.set_override("=x"), Err(ConfigError::InvalidOverride(_))));
  }

  #[test]
  fn booleans() {
    let config = Config::from_yaml("services", SERVICES_YAML).unwrap();
    assert!(config.require_bool("debug").unwrap());
    assert_eq!(config.get_bool("absent").unwrap(), None);
  }

  #[test]
  fn load_from_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("Stackweave.dev.yaml");
    fs::write(&path, SERVICES_YAML).unwrap();

    let config = Config::from_file("services", &path).unwrap();
    assert_eq!(config.require_str("mongoHost").unwrap(), "mongodb://mongo:27017");

    let missing = Config::load_optional("services", &temp.path().join("nope.yaml")).unwrap();
    assert_eq!(missing.keys().count(), 0);

    fs::write(&path, "config: [").unwrap();
    assert!(matches!(
      Config::from_file("services", &path),
      Err(ConfigError::Parse { .. })
    ));
  }
}
