//! Read-only access to another stack's exports.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::StackName;
use crate::output::Output;
use crate::state::{ExportEntry, ExportMap, StateBackend};
use crate::value::Value;

/// Why a value from another stack is unavailable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StackReferenceError {
  /// The stack has never persisted an export table.
  #[error("stack '{0}' has no persisted exports")]
  UnknownStack(StackName),

  /// The stack exists but does not export `output`.
  #[error("stack '{stack}' has no output '{output}'")]
  UnknownOutput { stack: StackName, output: String },

  /// The state backend could not be read.
  #[error("failed to read stack state: {0}")]
  State(String),
}

/// A point-in-time snapshot of another stack's exports.
///
/// The export table is read once, when the reference is created. Values
/// taken from it are ordinary outputs: secrecy carries over, but they do not
/// add an edge to any resource of the current stack.
#[derive(Debug, Clone)]
pub struct StackReference {
  name: StackName,
  snapshot: Result<Arc<ExportMap>, StackReferenceError>,
}

impl StackReference {
  /// Read `name`'s exports from `backend`.
  ///
  /// Never fails by itself; a missing stack surfaces on each lookup.
  pub fn resolve(backend: &dyn StateBackend, name: StackName) -> Self {
    let snapshot = match backend.load_exports(&name) {
      Ok(Some(exports)) => {
        debug!(stack = %name, outputs = exports.len(), "read stack reference");
        Ok(Arc::new(exports))
      }
      Ok(None) => Err(StackReferenceError::UnknownStack(name.clone())),
      Err(e) => Err(StackReferenceError::State(e.to_string())),
    };
    Self { name, snapshot }
  }

  pub fn name(&self) -> &StackName {
    &self.name
  }

  /// Names of every output the referenced stack exports.
  pub fn output_names(&self) -> Result<Vec<&str>, StackReferenceError> {
    let exports = self.snapshot.as_ref().map_err(Clone::clone)?;
    Ok(exports.keys().map(String::as_str).collect())
  }

  /// Look up one exported value.
  ///
  /// Lookup failures become failed outputs, so they only affect resources
  /// and exports that consume the value.
  pub fn get_output(&self, output: &str) -> Output<Value> {
    match self.lookup(output) {
      Ok(entry) if entry.secret => Output::secret(entry.value.clone()),
      Ok(entry) => Output::new(entry.value.clone()),
      Err(err) => Output::failed(err.into()),
    }
  }

  /// Like [`get_output`](Self::get_output), but fail immediately.
  pub fn require_output(&self, output: &str) -> Result<Output<Value>, StackReferenceError> {
    let entry = self.lookup(output)?;
    Ok(if entry.secret {
      Output::secret(entry.value.clone())
    } else {
      Output::new(entry.value.clone())
    })
  }

  fn lookup(&self, output: &str) -> Result<&ExportEntry, StackReferenceError> {
    let exports = self.snapshot.as_ref().map_err(Clone::clone)?;
    exports.get(output).ok_or_else(|| StackReferenceError::UnknownOutput {
      stack: self.name.clone(),
      output: output.to_string(),
    })
  }
}
