mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{RunArgs, StackArgs};
use output::print_error;

/// stackweave - declare, wire and deploy stacks of resources
#[derive(Parser)]
#[command(name = "stackweave")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Deploy a program's stack and save its exports
  Up {
    /// Built-in program to run (services, shop)
    program: String,

    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    run: RunArgs,
  },

  /// Walk a program's graph without calling providers
  Preview {
    /// Built-in program to run (services, shop)
    program: String,

    #[command(flatten)]
    stack: StackArgs,

    #[command(flatten)]
    run: RunArgs,
  },

  /// Show a program's resources, edges and execution waves
  Graph {
    /// Built-in program to inspect (services, shop)
    program: String,

    #[command(flatten)]
    stack: StackArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the saved exports of a stack
  Outputs {
    /// Fully qualified stack name: <organization>/<project>/<stack>
    stack_ref: String,

    /// Print only this output's value
    output: Option<String>,

    /// State directory (default: $STACKWEAVE_STATE_DIR or the platform data dir)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Print secret values instead of redacting them
    #[arg(long)]
    show_secrets: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Commands::Up { program, stack, run } => cmd::cmd_up(&program, &stack, &run, cli.verbose),
    Commands::Preview { program, stack, run } => cmd::cmd_preview(&program, &stack, &run, cli.verbose),
    Commands::Graph { program, stack, json } => cmd::cmd_graph(&program, &stack, json),
    Commands::Outputs {
      stack_ref,
      output,
      state_dir,
      show_secrets,
      json,
    } => cmd::cmd_outputs(&stack_ref, output.as_deref(), state_dir.as_deref(), show_secrets, json),
  }
}
