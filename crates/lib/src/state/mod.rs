//! Persisted stack exports.
//!
//! The engine touches persisted state in exactly two places: a stack
//! reference reads another stack's exports, and a successful deployment
//! writes its own. Both go through [`StateBackend`].

mod file;

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stack::StackName;
use crate::value::Value;

pub use file::{FileBackend, STATE_DIR_ENV, StackState};

/// Current version of the on-disk stack state format.
pub const STATE_VERSION: u32 = 1;

/// One exported value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
  pub value: Value,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub secret: bool,
}

impl ExportEntry {
  pub fn new(value: impl Into<Value>) -> Self {
    Self {
      value: value.into(),
      secret: false,
    }
  }

  pub fn secret(value: impl Into<Value>) -> Self {
    Self {
      value: value.into(),
      secret: true,
    }
  }
}

/// A stack's published exports, by name.
pub type ExportMap = BTreeMap<String, ExportEntry>;

/// Errors from reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StateError {
  #[error("failed to create state directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to read stack state: {0}")]
  Read(#[source] io::Error),

  #[error("failed to write stack state: {0}")]
  Write(#[source] io::Error),

  #[error("failed to parse stack state: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("failed to serialize stack state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported state version {0} (expected {STATE_VERSION})")]
  UnsupportedVersion(u32),

  #[error("state backend lock poisoned")]
  Poisoned,
}

/// Storage for stack exports.
///
/// Reads are point-in-time snapshots; implementations must not require the
/// reader to lock the referenced stack.
pub trait StateBackend: Send + Sync {
  /// Load a stack's exports. `Ok(None)` if the stack was never deployed.
  fn load_exports(&self, stack: &StackName) -> Result<Option<ExportMap>, StateError>;

  /// Replace a stack's exports.
  fn save_exports(&self, stack: &StackName, exports: &ExportMap) -> Result<(), StateError>;
}

/// In-memory backend for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryBackend {
  stacks: RwLock<HashMap<StackName, ExportMap>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed a stack's exports.
  pub fn with_stack(self, stack: StackName, exports: ExportMap) -> Self {
    if let Ok(mut stacks) = self.stacks.write() {
      stacks.insert(stack, exports);
    }
    self
  }
}

impl StateBackend for MemoryBackend {
  fn load_exports(&self, stack: &StackName) -> Result<Option<ExportMap>, StateError> {
    let stacks = self.stacks.read().map_err(|_| StateError::Poisoned)?;
    Ok(stacks.get(stack).cloned())
  }

  fn save_exports(&self, stack: &StackName, exports: &ExportMap) -> Result<(), StateError> {
    let mut stacks = self.stacks.write().map_err(|_| StateError::Poisoned)?;
    stacks.insert(stack.clone(), exports.clone());
    Ok(())
  }
}
