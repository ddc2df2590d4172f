//! Implementation of the `stackweave outputs` command.
//!
//! Reads a stack's saved exports, the same table stack references resolve
//! against.

use std::path::Path;

use anyhow::{Context, Result};

use stackweave_lib::stack::{StackName, StackReferenceError};
use stackweave_lib::state::{ExportMap, StateBackend};

use super::state_backend;
use crate::output::{display_export, exports_json, print_info, print_json, print_stat};

pub fn cmd_outputs(
  stack_ref: &str,
  output: Option<&str>,
  state_dir: Option<&Path>,
  show_secrets: bool,
  json: bool,
) -> Result<()> {
  let name: StackName = stack_ref.parse()?;
  let backend = state_backend(state_dir);

  let exports = backend
    .load_exports(&name)
    .with_context(|| format!("Failed to read state of {}", name))?
    .ok_or_else(|| StackReferenceError::UnknownStack(name.clone()))?;

  if let Some(output) = output {
    let entry = exports.get(output).ok_or_else(|| StackReferenceError::UnknownOutput {
      stack: name.clone(),
      output: output.to_string(),
    })?;
    if json {
      let single: ExportMap = [(output.to_string(), entry.clone())].into_iter().collect();
      return print_json(&exports_json(&single, show_secrets)?[output]);
    }
    println!("{}", display_export(entry, show_secrets));
    return Ok(());
  }

  if json {
    return print_json(&exports_json(&exports, show_secrets)?);
  }

  print_info(&format!("Outputs of {}", name));
  for (key, entry) in &exports {
    print_stat(key, &display_export(entry, show_secrets));
  }

  Ok(())
}
