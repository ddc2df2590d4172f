//! File-backed stack state.
//!
//! # Storage Layout
//!
//! ```text
//! {state_dir}/
//! └── <organization>/
//!     └── <project>/
//!         └── <stack>.json   # StackState
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ExportMap, STATE_VERSION, StateBackend, StateError};
use crate::stack::StackName;

/// Environment variable overriding the default state directory.
pub const STATE_DIR_ENV: &str = "STACKWEAVE_STATE_DIR";

/// On-disk representation of one stack's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
  pub version: u32,
  pub stack: String,
  /// Seconds since the Unix epoch of the last successful deployment.
  pub updated_at: u64,
  pub exports: ExportMap,
}

/// Stores each stack's exports as a JSON file under a base directory.
///
/// Writes are atomic (write to temp, then rename), so concurrent readers
/// always see either the previous or the new export table.
#[derive(Debug, Clone)]
pub struct FileBackend {
  base_path: PathBuf,
}

impl FileBackend {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// Backend at `$STACKWEAVE_STATE_DIR`, or the platform data directory.
  ///
  /// - Linux: `~/.local/share/stackweave/state`
  /// - macOS: `~/Library/Application Support/stackweave/state`
  /// - Windows: `%APPDATA%\stackweave\state`
  pub fn default_backend() -> Self {
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|d| !d.is_empty()) {
      return Self::new(dir);
    }
    let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    Self::new(base.join("stackweave").join("state"))
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn stack_path(&self, stack: &StackName) -> PathBuf {
    self
      .base_path
      .join(&stack.organization)
      .join(&stack.project)
      .join(format!("{}.json", stack.stack))
  }
}

impl StateBackend for FileBackend {
  fn load_exports(&self, stack: &StackName) -> Result<Option<ExportMap>, StateError> {
    let path = self.stack_path(stack);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(StateError::Read(e)),
    };

    let state: StackState = serde_json::from_str(&content).map_err(StateError::Parse)?;
    if state.version != STATE_VERSION {
      return Err(StateError::UnsupportedVersion(state.version));
    }

    debug!(stack = %stack, path = %path.display(), exports = state.exports.len(), "loaded stack state");
    Ok(Some(state.exports))
  }

  fn save_exports(&self, stack: &StackName, exports: &ExportMap) -> Result<(), StateError> {
    let path = self.stack_path(stack);
    let dir = path.parent().unwrap_or(&self.base_path);
    fs::create_dir_all(dir).map_err(StateError::CreateDir)?;

    let state = StackState {
      version: STATE_VERSION,
      stack: stack.to_string(),
      updated_at: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default(),
      exports: exports.clone(),
    };

    let temp_path = dir.join(format!("{}.json.tmp", stack.stack));
    let content = serde_json::to_string_pretty(&state).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(StateError::Write)?;
    fs::rename(&temp_path, &path).map_err(StateError::Write)?;

    debug!(stack = %stack, path = %path.display(), "saved stack state");
    Ok(())
  }
}
