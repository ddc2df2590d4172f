//! The stack context.
//!
//! A [`Stack`] is what a program runs against: it owns the resource
//! declarations, the export table, the stack's configuration and the state
//! backend used to resolve stack references. It is passed explicitly to
//! program code; there is no ambient global context.

mod exports;
mod reference;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, ConfigError};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::Output;
use crate::resource::{PropertyOutputs, Resource, ResourceId, ResourceNode, ResourceOptions};
use crate::state::StateBackend;
use crate::value::Value;

pub use exports::{ExportError, ExportTable, ResolvedExports};
pub use reference::{StackReference, StackReferenceError};

/// Errors raised while a program declares its stack.
#[derive(Debug, Error)]
pub enum StackError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  StackReference(#[from] StackReferenceError),

  #[error("invalid stack name '{0}': expected <organization>/<project>/<stack>")]
  InvalidName(String),
}

/// Fully qualified stack name: `<organization>/<project>/<stack>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StackName {
  pub organization: String,
  pub project: String,
  pub stack: String,
}

impl StackName {
  pub fn new(organization: impl Into<String>, project: impl Into<String>, stack: impl Into<String>) -> Self {
    Self {
      organization: organization.into(),
      project: project.into(),
      stack: stack.into(),
    }
  }
}

impl FromStr for StackName {
  type Err = StackError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let parts: Vec<&str> = s.split('/').collect();
    // Each segment becomes a path component in the file backend.
    let valid = |part: &&str| {
      !part.is_empty()
        && *part != "."
        && *part != ".."
        && !part.contains(|c: char| c.is_whitespace() || c == '\\' || c == ':')
    };
    match parts.as_slice() {
      [org, project, stack] if parts.iter().all(valid) => {
        Ok(StackName::new(*org, *project, *stack))
      }
      _ => Err(StackError::InvalidName(s.to_string())),
    }
  }
}

impl fmt::Display for StackName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.organization, self.project, self.stack)
  }
}

/// A stack being declared.
pub struct Stack {
  name: StackName,
  config: Config,
  builder: GraphBuilder,
  exports: ExportTable,
  backend: Arc<dyn StateBackend>,
}

impl Stack {
  pub fn new(name: StackName, config: Config, backend: Arc<dyn StateBackend>) -> Self {
    Self {
      name,
      config,
      builder: GraphBuilder::new(),
      exports: ExportTable::new(),
      backend,
    }
  }

  pub fn name(&self) -> &StackName {
    &self.name
  }

  /// The short stack name, e.g. `dev`.
  pub fn stack(&self) -> &str {
    &self.name.stack
  }

  pub fn project(&self) -> &str {
    &self.name.project
  }

  pub fn organization(&self) -> &str {
    &self.name.organization
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Declare a resource.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateIdentity` if a resource with the same type token and
  /// name was already declared.
  pub fn declare(
    &mut self,
    type_token: &str,
    name: &str,
    properties: PropertyOutputs,
    options: ResourceOptions,
  ) -> Result<Resource, StackError> {
    let id = ResourceId::new(type_token, name);
    let (node, handle) = ResourceNode::declare(id, properties, options);
    debug!(resource = %node.id, provider = %node.provider, "declared resource");
    self.builder.declare(node)?;
    Ok(handle)
  }

  /// Publish a value under `name`.
  pub fn export(&mut self, name: &str, output: Output<Value>) {
    self.exports.insert(name, output);
  }

  /// Read another stack's exports.
  ///
  /// `name` is `<organization>/<project>/<stack>`. A stack that was never
  /// deployed does not fail here; lookups on it fail with `UnknownStack`.
  pub fn stack_reference(&self, name: &str) -> Result<StackReference, StackError> {
    let name: StackName = name.parse()?;
    Ok(StackReference::resolve(self.backend.as_ref(), name))
  }

  pub fn resource_count(&self) -> usize {
    self.builder.len()
  }

  pub fn exports(&self) -> &ExportTable {
    &self.exports
  }

  /// Hand the declarations over for execution.
  pub fn into_parts(self) -> (StackName, GraphBuilder, ExportTable, Arc<dyn StateBackend>) {
    (self.name, self.builder, self.exports, self.backend)
  }
}

impl fmt::Debug for Stack {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Stack")
      .field("name", &self.name)
      .field("resources", &self.builder.len())
      .field("exports", &self.exports.len())
      .finish()
  }
}
