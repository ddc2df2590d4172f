//! Execution of resource graphs.
//!
//! The executor is a single coordinating task that owns the graph. A node
//! becomes eligible the moment its last dependency has applied, and is then
//! spawned onto a [`JoinSet`]; a semaphore bounds how many provider calls are
//! in flight at once. There are no waves: an unrelated slow node never holds
//! back anything that does not depend on it.
//!
//! When a node fails, every transitive dependent is marked skipped and its
//! produced outputs fail with the same cause. Independent nodes keep going.
//!
//! A spawned node first waits for its inputs, then for a permit. Both waits
//! end early on cancellation, so no provider call starts once `cancel` has
//! fired. Input waits are also bounded by the node's timeout: an input that
//! reaches another resource through `apply` is invisible to the graph and
//! may never settle.

mod deploy;
mod types;

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::Bfs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::graph::ResourceGraph;
use crate::output::{OutputError, OutputSender};
use crate::provider::{ApplyRequest, Provider, ProviderError, ProviderRegistry};
use crate::resource::{LifecycleStage, PropertyOutputs, ResourceId};
use crate::value::PropertyMap;

pub use deploy::{DeployResult, deploy};
pub use types::*;

/// Result of one node task.
struct NodeRun {
  index: usize,
  started: Instant,
  finished: Instant,
  result: NodeResult,
}

/// Everything a node task owns.
struct NodeTask {
  id: ResourceId,
  properties: PropertyOutputs,
  provider: Arc<dyn Provider>,
  semaphore: Arc<Semaphore>,
  timeout: Duration,
  dry_run: bool,
  cancel: CancellationToken,
}

enum NodeResult {
  Applied {
    properties: PropertyMap,
    /// Set when any input settled secret.
    secret: bool,
  },
  Planned,
  Failed(NodeFailure),
  /// Cancellation fired before the provider was called.
  NotStarted,
}

/// Mutable bookkeeping for one node while the executor runs.
struct Slot {
  id: ResourceId,
  stage: LifecycleStage,
  sender: Option<OutputSender<PropertyMap>>,
  outcome: Option<NodeOutcome>,
  started_at: Option<Instant>,
  finished_at: Option<Instant>,
}

impl Slot {
  fn settle_failed(&mut self, cause: OutputError) {
    if let Some(sender) = self.sender.take() {
      sender.fail(cause);
    }
  }
}

/// Execute every node of `graph`.
///
/// Returns the report when every node applied (or was planned, for a dry
/// run).
///
/// # Errors
///
/// - `ProviderNotFound` if a node's provider kind is not registered; nothing
///   is applied in that case
/// - `PartialApply` if any node failed or was skipped
/// - `Cancelled` if `cancel` fired before every node started; nodes already
///   calling their provider finish first
pub async fn execute(
  graph: ResourceGraph,
  providers: &ProviderRegistry,
  config: &ExecuteConfig,
  cancel: CancellationToken,
) -> Result<ExecutionReport, ExecuteError> {
  let start = Instant::now();
  let (dag, nodes) = graph.into_parts();

  // Resolve every provider up front so a missing kind fails before any apply.
  let mut resolved_providers: Vec<Arc<dyn Provider>> = Vec::with_capacity(nodes.len());
  for node in &nodes {
    let provider = providers.get(&node.provider).ok_or_else(|| ExecuteError::ProviderNotFound {
      provider: node.provider.clone(),
      resource: node.id.clone(),
    })?;
    resolved_providers.push(provider);
  }

  info!(
    resources = nodes.len(),
    parallelism = config.parallelism,
    dry_run = config.dry_run,
    "starting execution"
  );

  let mut slots = Vec::with_capacity(nodes.len());
  let mut work = Vec::with_capacity(nodes.len());
  for mut node in nodes {
    slots.push(Slot {
      id: node.id.clone(),
      stage: LifecycleStage::Pending,
      sender: node.take_sender(),
      outcome: None,
      started_at: None,
      finished_at: None,
    });
    work.push(Some((node.properties, node.timeout)));
  }

  let mut waiting_on: Vec<usize> = dag
    .node_indices()
    .map(|idx| dag.neighbors_directed(idx, Direction::Incoming).count())
    .collect();
  let mut ready: VecDeque<usize> = (0..slots.len()).filter(|&i| waiting_on[i] == 0).collect();

  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut join_set: JoinSet<NodeRun> = JoinSet::new();
  let mut cancelling = false;

  loop {
    if !cancel.is_cancelled() {
      while let Some(index) = ready.pop_front() {
        if slots[index].outcome.is_some() {
          continue;
        }
        let Some((properties, timeout)) = work[index].take() else {
          continue;
        };

        let slot = &mut slots[index];
        slot.stage = LifecycleStage::Applying;
        debug!(resource = %slot.id, "applying resource");

        join_set.spawn(run_node(
          index,
          NodeTask {
            id: slot.id.clone(),
            properties,
            provider: Arc::clone(&resolved_providers[index]),
            semaphore: Arc::clone(&semaphore),
            timeout: timeout.unwrap_or(config.timeout),
            dry_run: config.dry_run,
            cancel: cancel.clone(),
          },
        ));
      }
    }

    if join_set.is_empty() {
      break;
    }

    tokio::select! {
      _ = cancel.cancelled(), if !cancelling => {
        cancelling = true;
        warn!(in_flight = join_set.len(), "cancellation requested, waiting for in-flight resources");
      }
      joined = join_set.join_next() => {
        match joined {
          Some(Ok(run)) => {
            let index = run.index;
            let slot = &mut slots[index];
            if matches!(run.result, NodeResult::NotStarted) {
              debug!(resource = %slot.id, "resource not started: execution cancelled");
              slot.stage = LifecycleStage::Pending;
              continue;
            }
            slot.started_at = Some(run.started);
            slot.finished_at = Some(run.finished);

            match run.result {
              NodeResult::Failed(failure) => {
                let cause = failure.to_output_error(&slot.id);
                error!(resource = %slot.id, error = %failure, "resource failed");
                slot.stage = LifecycleStage::Failed;
                slot.settle_failed(cause.clone());
                slot.outcome = Some(NodeOutcome::Failed(failure));
                let failed = slot.id.clone();

                let mut bfs = Bfs::new(&dag, NodeIndex::new(index));
                while let Some(next) = bfs.next(&dag) {
                  let dependent = &mut slots[next.index()];
                  if next.index() == index || dependent.outcome.is_some() {
                    continue;
                  }
                  warn!(resource = %dependent.id, failed_dependency = %failed, "skipping resource");
                  dependent.settle_failed(cause.clone());
                  dependent.outcome = Some(NodeOutcome::Skipped {
                    failed_dependency: failed.clone(),
                    cause: cause.clone(),
                  });
                }
              }
              result => {
                complete(slot, result);
                for dependent in dag.neighbors_directed(NodeIndex::new(index), Direction::Outgoing) {
                  let d = dependent.index();
                  waiting_on[d] = waiting_on[d].saturating_sub(1);
                  if waiting_on[d] == 0 {
                    ready.push_back(d);
                  }
                }
              }
            }
          }
          Some(Err(e)) => {
            // Node tasks catch panics themselves, so this is an abort.
            error!(error = %e, "resource task ended unexpectedly");
          }
          None => break,
        }
      }
    }
  }

  for slot in slots.iter_mut().filter(|s| s.outcome.is_none()) {
    warn!(resource = %slot.id, "resource not applied: execution cancelled");
    slot.settle_failed(OutputError::Cancelled {
      resource: slot.id.clone(),
    });
    slot.outcome = Some(NodeOutcome::Cancelled);
  }

  let report = ExecutionReport {
    nodes: slots
      .into_iter()
      .map(|slot| NodeReport {
        id: slot.id,
        stage: slot.stage,
        outcome: slot.outcome.unwrap_or(NodeOutcome::Cancelled),
        started_at: slot.started_at,
        finished_at: slot.finished_at,
      })
      .collect(),
    elapsed: start.elapsed(),
  };

  info!(
    applied = report.applied().len(),
    planned = report.planned().len(),
    failed = report.failed().len(),
    skipped = report.skipped().len(),
    cancelled = report.cancelled().len(),
    elapsed = ?report.elapsed,
    "execution complete"
  );

  if !report.cancelled().is_empty() {
    return Err(ExecuteError::Cancelled(Box::new(report)));
  }
  if !report.is_success() {
    return Err(PartialApplyError { report }.into());
  }
  Ok(report)
}

/// Record a successful node and publish its produced properties.
fn complete(slot: &mut Slot, result: NodeResult) {
  let sender = slot.sender.take();
  match result {
    NodeResult::Applied { properties, secret } => {
      info!(resource = %slot.id, "resource applied");
      slot.stage = LifecycleStage::Applied;
      slot.outcome = Some(NodeOutcome::Applied);
      if let Some(sender) = sender {
        sender.resolve_with(properties, secret);
      }
    }
    _ => {
      debug!(resource = %slot.id, "resource planned");
      slot.stage = LifecycleStage::Pending;
      slot.outcome = Some(NodeOutcome::Planned);
      if let Some(sender) = sender {
        sender.unknown();
      }
    }
  }
}

async fn run_node(index: usize, task: NodeTask) -> NodeRun {
  let started = Instant::now();
  let result = AssertUnwindSafe(apply_node(task))
    .catch_unwind()
    .await
    .unwrap_or_else(|panic| NodeResult::Failed(NodeFailure::Panicked(panic_message(&*panic))));

  NodeRun {
    index,
    started,
    finished: Instant::now(),
    result,
  }
}

/// Resolve inputs, then call the provider under the permit and timeout.
///
/// Produced properties are the resolved inputs overlaid with whatever the
/// provider returned.
async fn apply_node(task: NodeTask) -> NodeResult {
  let NodeTask {
    id,
    properties,
    provider,
    semaphore,
    timeout,
    dry_run,
    cancel,
  } = task;

  let (resolved, secret) = tokio::select! {
    biased;
    _ = cancel.cancelled() => return NodeResult::NotStarted,
    inputs = tokio::time::timeout(timeout, resolve_inputs(properties, dry_run)) => match inputs {
      Err(_) => {
        warn!(resource = %id, ?timeout, "inputs did not settle in time");
        return NodeResult::Failed(NodeFailure::Timeout(timeout));
      }
      Ok(Err(failure)) => return NodeResult::Failed(failure),
      Ok(Ok(inputs)) => inputs,
    },
  };

  if dry_run {
    return NodeResult::Planned;
  }

  let permit = tokio::select! {
    biased;
    _ = cancel.cancelled() => return NodeResult::NotStarted,
    permit = semaphore.acquire_owned() => permit,
  };
  let Ok(_permit) = permit else {
    return NodeResult::Failed(NodeFailure::Provider(ProviderError::new("worker pool closed")));
  };

  let request = ApplyRequest { id, properties: resolved };
  match tokio::time::timeout(timeout, provider.apply(&request)).await {
    Err(_) => NodeResult::Failed(NodeFailure::Timeout(timeout)),
    Ok(Err(err)) => NodeResult::Failed(NodeFailure::Provider(err)),
    Ok(Ok(produced)) => {
      let mut properties = request.properties;
      properties.extend(produced);
      NodeResult::Applied { properties, secret }
    }
  }
}

/// Wait for every input property.
///
/// The flag is set when any input settled secret, which covers inputs that
/// only turn secret once resolved.
async fn resolve_inputs(properties: PropertyOutputs, dry_run: bool) -> Result<(PropertyMap, bool), NodeFailure> {
  let mut resolved = PropertyMap::new();
  let mut secret = false;
  for (property, output) in properties {
    match output.resolve().await {
      Ok(Some(value)) => {
        resolved.insert(property, value);
      }
      Ok(None) if dry_run => {}
      Ok(None) => return Err(NodeFailure::UnknownInput { property }),
      Err(cause) => return Err(NodeFailure::Input { property, cause }),
    }
    secret |= output.is_secret();
  }
  Ok((resolved, secret))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}
