//! Types for graph execution.
//!
//! This module defines the error types, per-node outcomes, the aggregate
//! report and the configuration for executing a resource graph.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::graph::GraphError;
use crate::output::OutputError;
use crate::provider::ProviderError;
use crate::resource::{LifecycleStage, ResourceId};
use crate::stack::ExportError;
use crate::state::StateError;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Why a node failed.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeFailure {
  /// The provider returned an error.
  Provider(ProviderError),
  /// The provider did not finish within the operation timeout.
  Timeout(Duration),
  /// An input property failed to resolve.
  Input { property: String, cause: OutputError },
  /// An input property was unknown outside a dry run.
  UnknownInput { property: String },
  /// The provider panicked.
  Panicked(String),
}

impl NodeFailure {
  /// The cause handed to the node's produced outputs and its dependents.
  ///
  /// Input failures pass the upstream cause through unchanged.
  pub fn to_output_error(&self, resource: &ResourceId) -> OutputError {
    match self {
      NodeFailure::Provider(err) => OutputError::ResourceFailed {
        resource: resource.clone(),
        message: err.message.clone(),
      },
      NodeFailure::Timeout(after) => OutputError::Timeout {
        resource: resource.clone(),
        after: *after,
      },
      NodeFailure::Input { cause, .. } => cause.clone(),
      NodeFailure::UnknownInput { property } => OutputError::ResourceFailed {
        resource: resource.clone(),
        message: format!("input '{}' is unknown", property),
      },
      NodeFailure::Panicked(message) => OutputError::ResourceFailed {
        resource: resource.clone(),
        message: format!("provider panicked: {}", message),
      },
    }
  }
}

impl fmt::Display for NodeFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeFailure::Provider(err) => write!(f, "provider error: {}", err),
      NodeFailure::Timeout(after) => write!(f, "timed out after {:?}", after),
      NodeFailure::Input { property, cause } => write!(f, "input '{}' failed: {}", property, cause),
      NodeFailure::UnknownInput { property } => write!(f, "input '{}' is unknown", property),
      NodeFailure::Panicked(message) => write!(f, "provider panicked: {}", message),
    }
  }
}

/// Terminal outcome of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
  Applied,
  /// Dry run: the node would have been applied.
  Planned,
  Failed(NodeFailure),
  /// Not started because a dependency failed.
  Skipped {
    failed_dependency: ResourceId,
    cause: OutputError,
  },
  /// Not started because execution was cancelled.
  Cancelled,
}

impl fmt::Display for NodeOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      NodeOutcome::Applied => write!(f, "applied"),
      NodeOutcome::Planned => write!(f, "planned"),
      NodeOutcome::Failed(failure) => write!(f, "failed: {}", failure),
      NodeOutcome::Skipped { failed_dependency, .. } => {
        write!(f, "skipped: dependency {} failed", failed_dependency)
      }
      NodeOutcome::Cancelled => write!(f, "cancelled"),
    }
  }
}

/// What happened to one node.
#[derive(Debug, Clone)]
pub struct NodeReport {
  pub id: ResourceId,
  /// Final lifecycle stage. Nodes that never started stay `Pending`.
  pub stage: LifecycleStage,
  pub outcome: NodeOutcome,
  pub started_at: Option<Instant>,
  pub finished_at: Option<Instant>,
}

/// Result of executing a whole graph.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
  /// One entry per node, in declaration order.
  pub nodes: Vec<NodeReport>,
  pub elapsed: Duration,
}

impl ExecutionReport {
  pub fn get(&self, id: &ResourceId) -> Option<&NodeReport> {
    self.nodes.iter().find(|n| &n.id == id)
  }

  pub fn applied(&self) -> Vec<&ResourceId> {
    self.with_outcome(|o| matches!(o, NodeOutcome::Applied))
  }

  pub fn planned(&self) -> Vec<&ResourceId> {
    self.with_outcome(|o| matches!(o, NodeOutcome::Planned))
  }

  pub fn skipped(&self) -> Vec<&ResourceId> {
    self.with_outcome(|o| matches!(o, NodeOutcome::Skipped { .. }))
  }

  pub fn cancelled(&self) -> Vec<&ResourceId> {
    self.with_outcome(|o| matches!(o, NodeOutcome::Cancelled))
  }

  /// Failed nodes with their failure.
  pub fn failed(&self) -> Vec<(&ResourceId, &NodeFailure)> {
    self
      .nodes
      .iter()
      .filter_map(|n| match &n.outcome {
        NodeOutcome::Failed(failure) => Some((&n.id, failure)),
        _ => None,
      })
      .collect()
  }

  /// Returns true if no node failed, was skipped or was cancelled.
  pub fn is_success(&self) -> bool {
    self
      .nodes
      .iter()
      .all(|n| matches!(n.outcome, NodeOutcome::Applied | NodeOutcome::Planned))
  }

  pub fn total(&self) -> usize {
    self.nodes.len()
  }

  fn with_outcome(&self, pred: impl Fn(&NodeOutcome) -> bool) -> Vec<&ResourceId> {
    self.nodes.iter().filter(|n| pred(&n.outcome)).map(|n| &n.id).collect()
  }
}

/// Some nodes failed or were skipped; independent nodes still ran.
#[derive(Debug, Clone, Error)]
#[error("{}", summarize(.report))]
pub struct PartialApplyError {
  pub report: ExecutionReport,
}

fn summarize(report: &ExecutionReport) -> String {
  let failed = report.failed();
  let skipped = report.skipped();
  let mut out = format!(
    "deployment partially applied: {} failed, {} skipped",
    failed.len(),
    skipped.len()
  );
  for node in &report.nodes {
    match &node.outcome {
      NodeOutcome::Failed(failure) => out.push_str(&format!("\n  {}: {}", node.id, failure)),
      NodeOutcome::Skipped { cause, .. } => out.push_str(&format!("\n  {}: skipped ({})", node.id, cause)),
      _ => {}
    }
  }
  out
}

/// Errors that end an execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// The graph could not be built. No provider was called.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// No provider is registered for a resource's kind. No provider was called.
  #[error("no provider registered for kind '{provider}' (needed by {resource})")]
  ProviderNotFound { provider: String, resource: ResourceId },

  #[error(transparent)]
  PartialApply(#[from] PartialApplyError),

  /// Execution was cancelled before every node ran.
  #[error("execution cancelled before every resource was applied")]
  Cancelled(Box<ExecutionReport>),

  /// A stack export failed to resolve.
  #[error(transparent)]
  Export(#[from] ExportError),

  #[error(transparent)]
  State(#[from] StateError),
}

impl ExecuteError {
  /// The execution report, when execution got as far as producing one.
  pub fn report(&self) -> Option<&ExecutionReport> {
    match self {
      ExecuteError::PartialApply(err) => Some(&err.report),
      ExecuteError::Cancelled(report) => Some(report),
      _ => None,
    }
  }
}

/// Configuration for graph execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of provider calls in flight.
  pub parallelism: usize,

  /// Per-operation timeout, unless the resource overrides it.
  pub timeout: Duration,

  /// Walk the graph without calling providers.
  pub dry_run: bool,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      timeout: DEFAULT_TIMEOUT,
      dry_run: false,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
