//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, human-readable durations, secret redaction and Unicode symbols.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use stackweave_lib::execute::{ExecutionReport, NodeOutcome, NodeReport};
use stackweave_lib::state::{ExportEntry, ExportMap};

/// Shown in place of secret values unless `--show-secrets` is given.
pub const REDACTED: &str = "[secret]";

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
  pub const PLUS: &str = "+";
  pub const MINUS: &str = "-";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Render an export for the terminal.
pub fn display_export(entry: &ExportEntry, show_secrets: bool) -> String {
  if entry.secret && !show_secrets {
    REDACTED.to_string()
  } else {
    entry.value.to_string()
  }
}

/// Exports as a JSON object, secrets redacted unless `show_secrets`.
pub fn exports_json(exports: &ExportMap, show_secrets: bool) -> anyhow::Result<serde_json::Value> {
  let mut object = serde_json::Map::new();
  for (name, entry) in exports {
    let value = if entry.secret && !show_secrets {
      serde_json::Value::from(REDACTED)
    } else {
      serde_json::to_value(&entry.value).with_context(|| format!("Failed to serialize export '{}'", name))?
    };
    object.insert(name.clone(), value);
  }
  Ok(serde_json::Value::Object(object))
}

fn node_elapsed(node: &NodeReport) -> Option<Duration> {
  match (node.started_at, node.finished_at) {
    (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
    _ => None,
  }
}

/// One line per resource, in declaration order.
pub fn print_report(report: &ExecutionReport, verbose: bool) {
  for node in &report.nodes {
    let symbol = match &node.outcome {
      NodeOutcome::Applied => symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
      NodeOutcome::Planned => symbols::PLUS.if_supports_color(Stream::Stdout, |s| s.blue()).to_string(),
      NodeOutcome::Failed(_) => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
      NodeOutcome::Skipped { .. } => symbols::WARNING.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
      NodeOutcome::Cancelled => symbols::MINUS.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
    };

    let mut line = format!("  {} {} ({})", symbol, node.id.name, node.id.type_token);
    match &node.outcome {
      NodeOutcome::Failed(failure) => line.push_str(&format!(" {} {}", symbols::ARROW, failure)),
      NodeOutcome::Skipped { failed_dependency, .. } => {
        line.push_str(&format!(" {} skipped, {} failed", symbols::ARROW, failed_dependency.name))
      }
      NodeOutcome::Cancelled => line.push_str(&format!(" {} cancelled", symbols::ARROW)),
      NodeOutcome::Applied | NodeOutcome::Planned => {
        if let Some(elapsed) = node_elapsed(node).filter(|_| verbose) {
          line.push_str(&format!(" [{}]", format_duration(elapsed)));
        }
      }
    }
    println!("{}", line);
  }
}

/// Report as JSON: one entry per resource with its outcome.
pub fn report_json(report: &ExecutionReport) -> serde_json::Value {
  let resources: Vec<_> = report
    .nodes
    .iter()
    .map(|node| {
      let mut entry = serde_json::json!({
        "type": node.id.type_token,
        "name": node.id.name,
        "stage": node.stage.to_string(),
        "outcome": outcome_label(&node.outcome),
      });
      match &node.outcome {
        NodeOutcome::Failed(failure) => entry["error"] = serde_json::Value::from(failure.to_string()),
        NodeOutcome::Skipped {
          failed_dependency,
          cause,
        } => {
          entry["failedDependency"] = serde_json::Value::from(failed_dependency.to_string());
          entry["error"] = serde_json::Value::from(cause.to_string());
        }
        _ => {}
      }
      if let Some(elapsed) = node_elapsed(node) {
        entry["elapsedMs"] = serde_json::Value::from(elapsed.as_millis() as u64);
      }
      entry
    })
    .collect();
  serde_json::json!({
    "resources": resources,
    "elapsedMs": report.elapsed.as_millis() as u64,
  })
}

fn outcome_label(outcome: &NodeOutcome) -> &'static str {
  match outcome {
    NodeOutcome::Applied => "applied",
    NodeOutcome::Planned => "planned",
    NodeOutcome::Failed(_) => "failed",
    NodeOutcome::Skipped { .. } => "skipped",
    NodeOutcome::Cancelled => "cancelled",
  }
}
