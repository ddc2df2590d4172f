mod graph;
mod outputs;
mod preview;
mod up;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use stackweave_lib::config::Config;
use stackweave_lib::execute::{DeployResult, ExecuteConfig, ExecuteError, deploy};
use stackweave_lib::program::{self, Program};
use stackweave_lib::provider::{EchoProvider, ProviderRegistry};
use stackweave_lib::stack::{Stack, StackName};
use stackweave_lib::state::FileBackend;

pub use graph::cmd_graph;
pub use outputs::cmd_outputs;
pub use preview::cmd_preview;
pub use up::cmd_up;

/// Organization used when neither `--config org=..` nor the config file names one.
const DEFAULT_ORGANIZATION: &str = "organization";

/// Which stack a program runs against, and where its config and state live.
#[derive(Debug, Clone, Args)]
pub struct StackArgs {
  /// Stack name
  #[arg(short, long, default_value = "dev")]
  pub stack: String,

  /// Project name (default: the program's own project)
  #[arg(long)]
  pub project: Option<String>,

  /// Config file (default: Stackweave.<stack>.yaml)
  #[arg(long)]
  pub config_file: Option<PathBuf>,

  /// Config override, `key=value` (repeatable)
  #[arg(short, long = "config", value_name = "KEY=VALUE")]
  pub config: Vec<String>,

  /// State directory (default: $STACKWEAVE_STATE_DIR or the platform data dir)
  #[arg(long)]
  pub state_dir: Option<PathBuf>,
}

/// Execution knobs shared by `up` and `preview`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
  /// Maximum number of resources applied at once (default: number of CPUs)
  #[arg(short = 'j', long)]
  pub parallelism: Option<usize>,

  /// Per-resource timeout, e.g. `30s` or `5m`
  #[arg(long, value_parser = humantime::parse_duration)]
  pub timeout: Option<Duration>,

  /// Print secret values instead of redacting them
  #[arg(long)]
  pub show_secrets: bool,

  /// Output as JSON
  #[arg(long)]
  pub json: bool,

  /// Make the local provider fail the named resource (repeatable)
  #[arg(long, value_name = "RESOURCE", hide = true)]
  pub fail: Vec<String>,
}

impl RunArgs {
  fn execute_config(&self, dry_run: bool) -> Result<ExecuteConfig> {
    let mut config = ExecuteConfig {
      dry_run,
      ..ExecuteConfig::default()
    };
    if let Some(parallelism) = self.parallelism {
      if parallelism == 0 {
        bail!("--parallelism must be at least 1");
      }
      config.parallelism = parallelism;
    }
    if let Some(timeout) = self.timeout {
      config.timeout = timeout;
    }
    Ok(config)
  }
}

fn find_program(name: &str) -> Result<Box<dyn Program>> {
  program::builtin(name)
    .ok_or_else(|| anyhow!("Unknown program '{}' (available: {})", name, program::BUILTIN.join(", ")))
}

fn state_backend(state_dir: Option<&Path>) -> FileBackend {
  match state_dir {
    Some(dir) => FileBackend::new(dir),
    None => FileBackend::default_backend(),
  }
}

/// Load config, name the stack and run the program's declarations.
fn declare_stack(program: &dyn Program, args: &StackArgs) -> Result<Stack> {
  let project = args.project.clone().unwrap_or_else(|| program.project().to_string());

  let config_path = args
    .config_file
    .clone()
    .unwrap_or_else(|| PathBuf::from(format!("Stackweave.{}.yaml", args.stack)));
  let mut config = Config::load_optional(project.as_str(), &config_path)
    .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
  for entry in &args.config {
    config.set_override(entry)?;
  }

  let organization = config
    .get("org")
    .and_then(|v| v.as_str())
    .unwrap_or(DEFAULT_ORGANIZATION)
    .to_string();
  let name: StackName = format!("{}/{}/{}", organization, project, args.stack).parse()?;

  let backend = state_backend(args.state_dir.as_deref());
  let mut stack = Stack::new(name, config, Arc::new(backend));
  program
    .run(&mut stack)
    .with_context(|| format!("Program '{}' failed", program.name()))?;
  Ok(stack)
}

fn providers(run: &RunArgs) -> ProviderRegistry {
  ProviderRegistry::new().with(
    "docker",
    Arc::new(EchoProvider::new().fail_on(run.fail.iter().cloned())),
  )
}

/// Deploy `stack` on a fresh runtime. Ctrl-C cancels the deployment.
fn run_deploy(stack: Stack, run: &RunArgs, dry_run: bool) -> Result<Result<DeployResult, ExecuteError>> {
  let config = run.execute_config(dry_run)?;
  let providers = providers(run);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
      let cancel = cancel.clone();
      async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          warn!("interrupted, waiting for in-flight resources");
          cancel.cancel();
        }
      }
    });
    let result = deploy(stack, &providers, &config, cancel).await;
    interrupt.abort();
    result
  });
  Ok(result)
}
