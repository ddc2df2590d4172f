//! Implementation of the `stackweave up` command.
//!
//! Runs a built-in program against a stack, applies every declared resource
//! in dependency order and saves the stack's exports for other stacks to
//! reference.

use anyhow::{Context, Result};

use stackweave_lib::execute::{DeployResult, ExecuteError};

use super::{RunArgs, StackArgs, declare_stack, find_program, run_deploy};
use crate::output::{
  display_export, exports_json, format_duration, print_info, print_json, print_report, print_stat, print_success,
  print_warning, report_json,
};

pub fn cmd_up(program: &str, stack_args: &StackArgs, run: &RunArgs, verbose: bool) -> Result<()> {
  let program = find_program(program)?;
  let stack = declare_stack(program.as_ref(), stack_args)?;
  let name = stack.name().clone();

  if !run.json {
    print_info(&format!("Deploying {} ({} resources)", name, stack.resource_count()));
  }

  match run_deploy(stack, run, false)? {
    Ok(result) => {
      if run.json {
        print_json(&result_json(&result, run.show_secrets)?)?;
      } else {
        print_report(&result.report, verbose);
        println!();
        print_success(&format!(
          "Applied {} resource(s) in {}",
          result.report.applied().len(),
          format_duration(result.report.elapsed)
        ));
        print_exports(&result, run.show_secrets);
      }
      Ok(())
    }
    Err(err) => {
      if let Some(report) = err.report() {
        if run.json {
          print_json(&report_json(report))?;
        } else {
          print_report(report, verbose);
          println!();
        }
      }
      if matches!(err, ExecuteError::Cancelled(_)) {
        print_warning("Applied resources were kept; exports were not saved");
      }
      Err(err).with_context(|| format!("Deployment of {} failed", name))
    }
  }
}

/// Print a deployment's exports, secrets redacted unless `show_secrets`.
pub(super) fn print_exports(result: &DeployResult, show_secrets: bool) {
  if result.exports.exports.is_empty() && result.exports.unknown.is_empty() {
    return;
  }
  println!();
  println!("Outputs:");
  for (name, entry) in &result.exports.exports {
    print_stat(name, &display_export(entry, show_secrets));
  }
  for name in &result.exports.unknown {
    print_stat(name, "(known after up)");
  }
}

pub(super) fn result_json(result: &DeployResult, show_secrets: bool) -> Result<serde_json::Value> {
  let mut json = report_json(&result.report);
  json["stack"] = serde_json::Value::from(result.stack.to_string());
  json["persisted"] = serde_json::Value::from(result.persisted);
  json["exports"] = exports_json(&result.exports.exports, show_secrets)?;
  json["unknownExports"] = serde_json::Value::from(result.exports.unknown.clone());
  Ok(json)
}
