//! The stack's export table.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::warn;

use crate::output::{Output, OutputError};
use crate::state::{ExportEntry, ExportMap};
use crate::value::Value;

/// An export that failed to resolve.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("export '{name}' failed: {cause}")]
pub struct ExportError {
  pub name: String,
  pub cause: OutputError,
}

/// Exports after resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedExports {
  pub exports: ExportMap,
  /// Exports whose value is unknown until a real deployment.
  pub unknown: Vec<String>,
}

/// Named outputs a stack publishes for other stacks to reference.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
  outputs: BTreeMap<String, Output<Value>>,
}

impl ExportTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Publish `output` as `name`. A later export of the same name wins.
  pub fn insert(&mut self, name: impl Into<String>, output: Output<Value>) {
    let name = name.into();
    if self.outputs.insert(name.clone(), output).is_some() {
      warn!(export = %name, "export redefined");
    }
  }

  pub fn get(&self, name: &str) -> Option<&Output<Value>> {
    self.outputs.get(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.outputs.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.outputs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outputs.is_empty()
  }

  /// Wait for every export.
  ///
  /// # Errors
  ///
  /// Returns the first export, by name, whose output failed.
  pub async fn resolve(&self) -> Result<ResolvedExports, ExportError> {
    let mut resolved = ResolvedExports::default();
    for (name, output) in &self.outputs {
      match output.resolve().await {
        Ok(Some(value)) => {
          let entry = ExportEntry {
            value,
            secret: output.is_secret(),
          };
          resolved.exports.insert(name.clone(), entry);
        }
        Ok(None) => resolved.unknown.push(name.clone()),
        Err(cause) => {
          return Err(ExportError {
            name: name.clone(),
            cause,
          });
        }
      }
    }
    Ok(resolved)
  }
}
