//! Implementation of the `stackweave graph` command.
//!
//! Declares a program's resources and prints the dependency graph the
//! executor would walk: resources, edges with how each was discovered, and
//! the waves of resources that can run together.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use super::{StackArgs, declare_stack, find_program};
use crate::output::{print_info, print_json, print_stat, symbols};

pub fn cmd_graph(program: &str, stack_args: &StackArgs, json: bool) -> Result<()> {
  let program = find_program(program)?;
  let stack = declare_stack(program.as_ref(), stack_args)?;
  let (name, builder, exports, _) = stack.into_parts();
  let graph = builder.build().context("Failed to build resource graph")?;

  let edges = graph.edges();
  let waves = graph.waves();

  if json {
    let json_output = serde_json::json!({
      "stack": name.to_string(),
      "resources": graph.topological_order().iter().map(|id| id.to_string()).collect::<Vec<_>>(),
      "edges": edges
        .iter()
        .map(|(from, to, kind)| serde_json::json!({ "from": from.to_string(), "to": to.to_string(), "kind": kind.to_string() }))
        .collect::<Vec<_>>(),
      "waves": waves
        .iter()
        .map(|wave| wave.iter().map(|id| id.name.clone()).collect::<Vec<_>>())
        .collect::<Vec<_>>(),
      "exports": exports.names().collect::<Vec<_>>(),
    });
    return print_json(&json_output);
  }

  print_info(&format!("{}: {} resource(s), {} edge(s)", name, graph.len(), edges.len()));

  println!();
  println!("Edges:");
  for (from, to, kind) in &edges {
    println!(
      "  {} {} {} {}",
      from.name,
      symbols::ARROW,
      to.name,
      format!("({})", kind).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }

  println!();
  println!("Waves:");
  for (i, wave) in waves.iter().enumerate() {
    let names: Vec<_> = wave.iter().map(|id| id.name.as_str()).collect();
    print_stat(&(i + 1).to_string(), &names.join(", "));
  }

  if !exports.is_empty() {
    println!();
    println!("Exports:");
    for export in exports.names() {
      println!("  {} {}", symbols::INFO, export);
    }
  }

  Ok(())
}
