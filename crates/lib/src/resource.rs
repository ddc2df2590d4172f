//! Resource declarations.
//!
//! A resource is identified by its type token and logical name. Its inputs
//! are a bag of [`Output`]s; its produced properties become available through
//! [`Resource::output`] once the executor has applied it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::output::{Output, OutputError, OutputSender};
use crate::value::{PropertyMap, Value};

/// Input properties of a resource, by name.
pub type PropertyOutputs = BTreeMap<String, Output<Value>>;

/// Identity of a resource within a stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
  /// Type token, e.g. `docker:index/network:Network`.
  pub type_token: String,
  /// Logical name chosen by the program.
  pub name: String,
}

impl ResourceId {
  pub fn new(type_token: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      type_token: type_token.into(),
      name: name.into(),
    }
  }

  /// Provider kind implied by the type token: the segment before the first `:`.
  pub fn provider_kind(&self) -> &str {
    self.type_token.split(':').next().unwrap_or(&self.type_token)
  }
}

impl fmt::Display for ResourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}::{}", self.type_token, self.name)
  }
}

/// Where a resource is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
  /// Registered with the stack, execution not started.
  Declared,
  /// Execution started, waiting on dependencies.
  Pending,
  /// Dispatched: resolving inputs or inside the provider call.
  Applying,
  Applied,
  Failed,
}

impl fmt::Display for LifecycleStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LifecycleStage::Declared => "declared",
      LifecycleStage::Pending => "pending",
      LifecycleStage::Applying => "applying",
      LifecycleStage::Applied => "applied",
      LifecycleStage::Failed => "failed",
    };
    write!(f, "{}", s)
  }
}

/// Per-resource options.
#[derive(Debug, Clone, Default)]
pub struct ResourceOptions {
  /// Resources that must be applied first, in addition to data dependencies.
  pub depends_on: BTreeSet<ResourceId>,
  /// Overrides the executor's operation timeout for this resource.
  pub timeout: Option<Duration>,
  /// Provider kind; defaults to the type token's package.
  pub provider: Option<String>,
  /// Mark every produced property as secret.
  pub secret_outputs: bool,
}

impl ResourceOptions {
  pub fn depends_on(mut self, resource: &Resource) -> Self {
    self.depends_on.insert(resource.id().clone());
    self
  }

  pub fn depends_on_id(mut self, id: ResourceId) -> Self {
    self.depends_on.insert(id);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn provider(mut self, provider: impl Into<String>) -> Self {
    self.provider = Some(provider.into());
    self
  }

  pub fn secret_outputs(mut self) -> Self {
    self.secret_outputs = true;
    self
  }
}

/// A declared resource as owned by the graph.
pub struct ResourceNode {
  pub id: ResourceId,
  pub provider: String,
  pub properties: PropertyOutputs,
  pub depends_on: BTreeSet<ResourceId>,
  pub timeout: Option<Duration>,
  pub stage: LifecycleStage,
  produced: Option<OutputSender<PropertyMap>>,
}

impl ResourceNode {
  /// Declare a node and return it with the handle program code keeps.
  ///
  /// Produced properties are secret if the options ask for it or any input
  /// is secret, since inputs are echoed into the produced map. Inputs that
  /// only turn secret once resolved are caught by the executor.
  pub fn declare(id: ResourceId, properties: PropertyOutputs, options: ResourceOptions) -> (Self, Resource) {
    let secret = options.secret_outputs || properties.values().any(Output::is_secret);
    let (produced, sender) = Output::deferred(Some(id.clone()), secret);
    let provider = options
      .provider
      .unwrap_or_else(|| id.provider_kind().to_string());

    let node = Self {
      id: id.clone(),
      provider,
      properties,
      depends_on: options.depends_on,
      timeout: options.timeout,
      stage: LifecycleStage::Declared,
      produced: Some(sender),
    };

    (node, Resource { id, produced })
  }

  /// Resources referenced by any input property.
  pub fn implicit_dependencies(&self) -> BTreeSet<ResourceId> {
    self
      .properties
      .values()
      .flat_map(|output| output.dependencies().iter().cloned())
      .collect()
  }

  /// Take the sender for this node's produced properties.
  ///
  /// Returns `None` after the first call.
  pub fn take_sender(&mut self) -> Option<OutputSender<PropertyMap>> {
    self.produced.take()
  }
}

impl fmt::Debug for ResourceNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceNode")
      .field("id", &self.id)
      .field("provider", &self.provider)
      .field("properties", &self.properties.keys().collect::<Vec<_>>())
      .field("depends_on", &self.depends_on)
      .field("stage", &self.stage)
      .finish()
  }
}

/// Handle to a declared resource.
#[derive(Debug, Clone)]
pub struct Resource {
  id: ResourceId,
  produced: Output<PropertyMap>,
}

impl Resource {
  pub fn id(&self) -> &ResourceId {
    &self.id
  }

  /// All properties the resource holds after apply: its resolved inputs
  /// overlaid with what the provider produced.
  pub fn outputs(&self) -> &Output<PropertyMap> {
    &self.produced
  }

  /// A single produced property.
  ///
  /// Fails with [`OutputError::MissingProperty`] if the applied resource
  /// does not have it.
  pub fn output(&self, property: &str) -> Output<Value> {
    let resource = self.id.clone();
    let property = property.to_string();
    self.produced.try_map(move |props| {
      props
        .get(&property)
        .cloned()
        .ok_or_else(|| OutputError::MissingProperty {
          resource: resource.clone(),
          property: property.clone(),
        })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn provider_kind_comes_from_type_token() {
    let id = ResourceId::new("docker:index/network:Network", "network");
    assert_eq!(id.provider_kind(), "docker");
    assert_eq!(id.to_string(), "docker:index/network:Network::network");
  }

  #[test]
  fn options_override_provider() {
    let id = ResourceId::new("docker:index/network:Network", "network");
    let (node, _) = ResourceNode::declare(id, PropertyOutputs::new(), ResourceOptions::default().provider("echo"));
    assert_eq!(node.provider, "echo");
    assert_eq!(node.stage, LifecycleStage::Declared);
  }

  #[test]
  fn implicit_dependencies_come_from_property_origins() {
    let net_id = ResourceId::new("docker:index/network:Network", "network");
    let (_, network) = ResourceNode::declare(net_id.clone(), PropertyOutputs::new(), ResourceOptions::default());

    let mut props = PropertyOutputs::new();
    props.insert("network".to_string(), network.output("name"));
    props.insert("image".to_string(), Output::from("mongo:latest"));
    let (node, _) = ResourceNode::declare(
      ResourceId::new("docker:index/container:Container", "mongo"),
      props,
      ResourceOptions::default(),
    );

    assert_eq!(node.implicit_dependencies(), BTreeSet::from([net_id]));
  }

  #[tokio::test]
  async fn output_resolves_after_sender_settles() {
    let id = ResourceId::new("docker:index/network:Network", "network");
    let (mut node, handle) = ResourceNode::declare(id.clone(), PropertyOutputs::new(), ResourceOptions::default());

    let name = handle.output("name");
    let missing = handle.output("driver");

    let mut produced = PropertyMap::new();
    produced.insert("name".to_string(), Value::from("services-dev"));
    node.take_sender().unwrap().resolve(produced);
    assert!(node.take_sender().is_none());

    assert_eq!(name.resolve().await, Ok(Some(Value::from("services-dev"))));
    assert_eq!(
      missing.resolve().await,
      Err(OutputError::MissingProperty {
        resource: id,
        property: "driver".to_string()
      })
    );
  }

  #[test]
  fn secret_outputs_option_marks_produced_properties() {
    let (_, handle) = ResourceNode::declare(
      ResourceId::new("docker:index/container:Container", "db"),
      PropertyOutputs::new(),
      ResourceOptions::default().secret_outputs(),
    );
    assert!(handle.output("password").is_secret());
  }

  #[test]
  fn secret_input_makes_outputs_secret() {
    let mut props = PropertyOutputs::new();
    props.insert("password".to_string(), Output::secret(Value::from("hunter2")));
    let (_, handle) = ResourceNode::declare(
      ResourceId::new("docker:index/container:Container", "db"),
      props,
      ResourceOptions::default(),
    );
    assert!(handle.output("id").is_secret());
  }
}
