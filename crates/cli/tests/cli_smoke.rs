//! CLI smoke tests for stackweave.
//!
//! These tests run the binary end to end against the built-in programs,
//! with state kept in a temp directory, and check exit codes and output.

use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the stackweave binary, run from `cwd`.
fn stackweave_cmd(cwd: &Path) -> Command {
  let mut cmd = cargo_bin_cmd!("stackweave");
  cmd.current_dir(cwd).env_remove("RUST_LOG");
  cmd
}

const SERVICES_CONFIG: &[&str] = &[
  "org=acme",
  "frontendPort=3001",
  "backendPort=3000",
  "mongoPort=27017",
  "mongoHost=mongodb://mongo:27017",
  "database=cart",
  "nodeEnvironment=development",
  "protocol=http://",
];

/// Same values as `SERVICES_CONFIG`, as a stack config file.
const SERVICES_CONFIG_FILE: &str = r#"
config:
  org: acme
  frontendPort: 3001
  backendPort: 3000
  mongoPort: 27017
  mongoHost: mongodb://mongo:27017
  database: cart
  nodeEnvironment: development
  protocol: http://
"#;

/// `stackweave <subcommand> <program>` with the services config and a state dir.
fn services_cmd(temp: &TempDir, subcommand: &str) -> Command {
  let mut cmd = stackweave_cmd(temp.path());
  cmd.arg(subcommand).arg("services").arg("--state-dir").arg(temp.path().join("state"));
  for entry in SERVICES_CONFIG {
    cmd.arg("--config").arg(entry);
  }
  cmd
}

fn shop_cmd(temp: &TempDir, subcommand: &str) -> Command {
  let mut cmd = stackweave_cmd(temp.path());
  cmd
    .arg(subcommand)
    .arg("shop")
    .arg("--state-dir")
    .arg(temp.path().join("state"))
    .arg("--config")
    .arg("org=acme");
  cmd
}

fn outputs_cmd(temp: &TempDir, stack: &str) -> Command {
  let mut cmd = stackweave_cmd(temp.path());
  cmd.arg("outputs").arg(stack).arg("--state-dir").arg(temp.path().join("state"));
  cmd
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  let temp = TempDir::new().unwrap();
  stackweave_cmd(temp.path())
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"));
}

#[test]
fn version_flag_works() {
  let temp = TempDir::new().unwrap();
  stackweave_cmd(temp.path())
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("stackweave"));
}

#[test]
fn subcommand_help_works() {
  let temp = TempDir::new().unwrap();
  for cmd in &["up", "preview", "graph", "outputs"] {
    stackweave_cmd(temp.path())
      .arg(cmd)
      .arg("--help")
      .assert()
      .success()
      .stdout(predicate::str::contains("Usage"));
  }
}

// =============================================================================
// up / outputs
// =============================================================================

#[test]
fn up_services_persists_exports() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "up")
    .assert()
    .success()
    .stdout(predicate::str::contains("Deploying acme/services/dev (7 resources)"))
    .stdout(predicate::str::contains("Applied 7 resource(s)"))
    .stdout(predicate::str::contains("http://localhost:3001"));

  assert!(temp.path().join("state/acme/services/dev.json").exists());

  outputs_cmd(&temp, "acme/services/dev")
    .arg("--json")
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""url": "http://localhost:3001""#))
    .stdout(predicate::str::contains(r#""containerNetwork": "services-dev""#));
}

#[test]
fn up_shop_reads_services_url() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "up").assert().success();
  shop_cmd(&temp, "up")
    .assert()
    .success()
    .stdout(predicate::str::contains("shopUrl"));

  outputs_cmd(&temp, "acme/shop/dev")
    .arg("shopUrl")
    .assert()
    .success()
    .stdout("http://localhost:3001\n");
}

#[test]
fn up_shop_without_services_fails() {
  let temp = TempDir::new().unwrap();

  shop_cmd(&temp, "up")
    .assert()
    .failure()
    .stderr(predicate::str::contains("stack 'acme/services/dev' has no persisted exports"));

  outputs_cmd(&temp, "acme/shop/dev").assert().failure();
}

#[test]
fn up_reads_stack_config_file() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("Stackweave.dev.yaml"), SERVICES_CONFIG_FILE).unwrap();

  stackweave_cmd(temp.path())
    .arg("up")
    .arg("services")
    .arg("--state-dir")
    .arg(temp.path().join("state"))
    .arg("--json")
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""stack": "acme/services/dev""#))
    .stdout(predicate::str::contains(r#""persisted": true"#));
}

#[test]
fn up_without_config_fails() {
  let temp = TempDir::new().unwrap();

  stackweave_cmd(temp.path())
    .arg("up")
    .arg("services")
    .arg("--state-dir")
    .arg(temp.path().join("state"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing required configuration value 'frontendPort'"));
}

#[test]
fn up_with_failing_resource_reports_partial_apply() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "up")
    .arg("--fail")
    .arg("network")
    .assert()
    .failure()
    .stdout(predicate::str::contains("injected failure for 'network'"))
    .stdout(predicate::str::contains("skipped, network failed"))
    .stderr(predicate::str::contains("deployment partially applied: 1 failed, 3 skipped"));

  outputs_cmd(&temp, "acme/services/dev").assert().failure();
}

#[test]
fn unknown_program_fails() {
  let temp = TempDir::new().unwrap();

  stackweave_cmd(temp.path())
    .arg("up")
    .arg("nope")
    .assert()
    .failure()
    .stderr(predicate::str::contains("Unknown program 'nope'"));
}

#[test]
fn outputs_rejects_malformed_stack_name() {
  let temp = TempDir::new().unwrap();

  outputs_cmd(&temp, "services/dev").assert().failure();
}

#[test]
fn stack_names_cannot_leave_the_state_dir() {
  let temp = TempDir::new().unwrap();

  outputs_cmd(&temp, "../../x")
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid stack name '../../x'"));

  services_cmd(&temp, "up")
    .arg("--stack")
    .arg("..")
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid stack name"));
  assert!(!temp.path().join("state").exists());
}

#[test]
#[serial]
fn outputs_reads_state_dir_from_env() {
  let temp = TempDir::new().unwrap();
  services_cmd(&temp, "up").assert().success();

  temp_env::with_var("STACKWEAVE_STATE_DIR", Some(temp.path().join("state")), || {
    stackweave_cmd(temp.path())
      .arg("outputs")
      .arg("acme/services/dev")
      .arg("url")
      .assert()
      .success()
      .stdout("http://localhost:3001\n");
  });
}

// =============================================================================
// preview / graph
// =============================================================================

#[test]
fn preview_does_not_persist() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "preview")
    .assert()
    .success()
    .stdout(predicate::str::contains("7 resource(s) would be applied"));

  assert!(!temp.path().join("state/acme/services/dev.json").exists());
  outputs_cmd(&temp, "acme/services/dev").assert().failure();
}

#[test]
fn graph_shows_edges_and_waves() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "graph")
    .assert()
    .success()
    .stdout(predicate::str::contains("mongo-container → backend-container (explicit)"))
    .stdout(predicate::str::contains("mongo-image → mongo-container (implicit)"))
    .stdout(predicate::str::contains("Waves:"));
}

#[test]
fn graph_json_lists_exports() {
  let temp = TempDir::new().unwrap();

  services_cmd(&temp, "graph")
    .arg("--json")
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""kind": "explicit""#))
    .stdout(predicate::str::contains(r#""url""#));
}
