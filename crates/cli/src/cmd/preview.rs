//! Implementation of the `stackweave preview` command.
//!
//! Walks the program's graph in dependency order without calling any
//! provider. Resource outputs stay unknown and nothing is saved.

use anyhow::{Context, Result};

use super::up::{print_exports, result_json};
use super::{RunArgs, StackArgs, declare_stack, find_program, run_deploy};
use crate::output::{print_info, print_json, print_report, print_success};

pub fn cmd_preview(program: &str, stack_args: &StackArgs, run: &RunArgs, verbose: bool) -> Result<()> {
  let program = find_program(program)?;
  let stack = declare_stack(program.as_ref(), stack_args)?;
  let name = stack.name().clone();

  if !run.json {
    print_info(&format!("Previewing {} ({} resources)", name, stack.resource_count()));
  }

  let result = run_deploy(stack, run, true)?.with_context(|| format!("Preview of {} failed", name))?;

  if run.json {
    print_json(&result_json(&result, run.show_secrets)?)?;
  } else {
    print_report(&result.report, verbose);
    println!();
    print_success(&format!("{} resource(s) would be applied", result.report.planned().len()));
    print_exports(&result, run.show_secrets);
  }

  Ok(())
}
