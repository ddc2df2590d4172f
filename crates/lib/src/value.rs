//! Dynamic property values.
//!
//! Resource properties, provider results and stack exports are all expressed
//! as [`Value`], a small JSON-like tree. The untagged serde representation
//! keeps persisted state files readable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A fully resolved property map, as sent to and returned by providers.
pub type PropertyMap = BTreeMap<String, Value>;

/// A dynamically typed property value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  Null,
  Boolean(bool),
  Number(f64),
  String(String),
  Array(Vec<Value>),
  Object(BTreeMap<String, Value>),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  /// Numeric view of the value. Numeric strings are accepted so that
  /// config values written as `"3000"` still parse as ports.
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Boolean(b) => Some(*b),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
    match self {
      Value::Object(map) => Some(map),
      _ => None,
    }
  }

  /// Look up a key in an object value.
  pub fn get(&self, key: &str) -> Option<&Value> {
    self.as_object().and_then(|map| map.get(key))
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }
}

/// Strings render without quotes so values can be interpolated directly
/// into environment entries and names.
impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Null => write!(f, "null"),
      Value::Boolean(b) => write!(f, "{}", b),
      Value::Number(n) => write!(f, "{}", n),
      Value::String(s) => write!(f, "{}", s),
      Value::Array(_) | Value::Object(_) => {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        write!(f, "{}", json)
      }
    }
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::String(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::String(value)
  }
}

impl From<bool> for Value {
  fn from(value: bool) -> Self {
    Value::Boolean(value)
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Number(value)
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Number(value as f64)
  }
}

impl From<u16> for Value {
  fn from(value: u16) -> Self {
    Value::Number(f64::from(value))
  }
}

impl From<Vec<Value>> for Value {
  fn from(value: Vec<Value>) -> Self {
    Value::Array(value)
  }
}

impl From<BTreeMap<String, Value>> for Value {
  fn from(value: BTreeMap<String, Value>) -> Self {
    Value::Object(value)
  }
}
