//! Deploying a declared stack: build, execute, resolve exports, persist.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ExecuteConfig, ExecuteError, ExecutionReport, execute};
use crate::provider::ProviderRegistry;
use crate::stack::{ResolvedExports, Stack, StackName};

/// Result of a successful deployment or preview.
#[derive(Debug, Clone)]
pub struct DeployResult {
  pub stack: StackName,
  pub report: ExecutionReport,
  pub exports: ResolvedExports,
  /// Whether the export table was written to the state backend.
  pub persisted: bool,
}

/// Build the stack's graph, execute it, and persist its exports.
///
/// Exports are saved once, only after every resource applied and every
/// export resolved. A dry run never writes state.
///
/// # Errors
///
/// - `Graph` for construction-time failures; no provider is called
/// - anything [`execute`] returns
/// - `Export` if an export failed to resolve
/// - `State` if the exports could not be written
pub async fn deploy(
  stack: Stack,
  providers: &ProviderRegistry,
  config: &ExecuteConfig,
  cancel: CancellationToken,
) -> Result<DeployResult, ExecuteError> {
  let (name, builder, exports, backend) = stack.into_parts();
  let graph = builder.build()?;
  info!(stack = %name, resources = graph.len(), exports = exports.len(), "deploying stack");

  let report = execute(graph, providers, config, cancel).await?;
  let resolved = exports.resolve().await?;

  let persisted = if config.dry_run {
    false
  } else {
    backend.save_exports(&name, &resolved.exports)?;
    info!(stack = %name, exports = resolved.exports.len(), "saved stack exports");
    true
  };

  Ok(DeployResult {
    stack: name,
    report,
    exports: resolved,
    persisted,
  })
}
