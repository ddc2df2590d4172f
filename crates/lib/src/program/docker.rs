//! Typed arguments for the docker resources the built-in programs use.
//!
//! These only shape property bags; applying them is up to whichever provider
//! is registered for the `docker` kind.

use crate::output::Output;
use crate::resource::{PropertyOutputs, Resource, ResourceOptions};
use crate::stack::{Stack, StackError};
use crate::value::Value;

pub const REMOTE_IMAGE: &str = "docker:index/remoteImage:RemoteImage";
pub const NETWORK: &str = "docker:index/network:Network";
pub const CONTAINER: &str = "docker:index/container:Container";

pub struct RemoteImageArgs {
  /// Image reference, e.g. `mongo:latest`.
  pub name: Output<Value>,
}

/// An image pulled from a registry.
#[derive(Debug, Clone)]
pub struct RemoteImage {
  resource: Resource,
}

impl RemoteImage {
  pub fn new(stack: &mut Stack, name: &str, args: RemoteImageArgs, options: ResourceOptions) -> Result<Self, StackError> {
    let mut properties = PropertyOutputs::new();
    properties.insert("name".to_string(), args.name);
    let resource = stack.declare(REMOTE_IMAGE, name, properties, options)?;
    Ok(Self { resource })
  }

  pub fn name(&self) -> Output<Value> {
    self.resource.output("name")
  }

  /// Pinned reference, `<name>@sha256:<digest>`.
  pub fn repo_digest(&self) -> Output<Value> {
    self.resource.output("repoDigest")
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }
}

pub struct NetworkArgs {
  pub name: Output<Value>,
}

#[derive(Debug, Clone)]
pub struct Network {
  resource: Resource,
}

impl Network {
  pub fn new(stack: &mut Stack, name: &str, args: NetworkArgs, options: ResourceOptions) -> Result<Self, StackError> {
    let mut properties = PropertyOutputs::new();
    properties.insert("name".to_string(), args.name);
    let resource = stack.declare(NETWORK, name, properties, options)?;
    Ok(Self { resource })
  }

  pub fn name(&self) -> Output<Value> {
    self.resource.output("name")
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }
}

/// A published port.
pub struct ContainerPort {
  pub internal: Output<Value>,
  pub external: Output<Value>,
}

impl ContainerPort {
  /// The same port inside and outside the container.
  pub fn same(port: f64) -> Self {
    Self {
      internal: Output::from(port),
      external: Output::from(port),
    }
  }
}

/// Attachment to a user-defined network.
pub struct NetworkAttachment {
  pub name: Output<Value>,
  pub aliases: Vec<Output<Value>>,
}

#[derive(Default)]
pub struct ContainerArgs {
  pub name: Option<Output<Value>>,
  pub image: Option<Output<Value>>,
  pub ports: Vec<ContainerPort>,
  /// `KEY=value` entries.
  pub envs: Vec<Output<Value>>,
  pub networks_advanced: Vec<NetworkAttachment>,
}

impl ContainerArgs {
  fn into_properties(self) -> PropertyOutputs {
    let mut properties = PropertyOutputs::new();
    if let Some(name) = self.name {
      properties.insert("name".to_string(), name);
    }
    if let Some(image) = self.image {
      properties.insert("image".to_string(), image);
    }
    if !self.ports.is_empty() {
      let ports = self
        .ports
        .into_iter()
        .map(|p| Output::object(vec![("internal".to_string(), p.internal), ("external".to_string(), p.external)]))
        .collect();
      properties.insert("ports".to_string(), Output::array(ports));
    }
    if !self.envs.is_empty() {
      properties.insert("envs".to_string(), Output::array(self.envs));
    }
    if !self.networks_advanced.is_empty() {
      let networks = self
        .networks_advanced
        .into_iter()
        .map(|n| {
          Output::object(vec![
            ("name".to_string(), n.name),
            ("aliases".to_string(), Output::array(n.aliases)),
          ])
        })
        .collect();
      properties.insert("networksAdvanced".to_string(), Output::array(networks));
    }
    properties
  }
}

#[derive(Debug, Clone)]
pub struct Container {
  resource: Resource,
}

impl Container {
  pub fn new(stack: &mut Stack, name: &str, args: ContainerArgs, options: ResourceOptions) -> Result<Self, StackError> {
    let resource = stack.declare(CONTAINER, name, args.into_properties(), options)?;
    Ok(Self { resource })
  }

  pub fn name(&self) -> Output<Value> {
    self.resource.output("name")
  }

  pub fn resource(&self) -> &Resource {
    &self.resource
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn container_args_shape_property_bag() {
    let args = ContainerArgs {
      name: Some(Output::from("mongo-dev")),
      image: Some(Output::from("mongo@sha256:abc")),
      ports: vec![ContainerPort::same(27017.0)],
      envs: vec![Output::from("A=1")],
      networks_advanced: vec![NetworkAttachment {
        name: Output::from("services-dev"),
        aliases: vec![Output::from("mongo")],
      }],
    };
    let properties = args.into_properties();
    assert_eq!(
      properties.keys().collect::<Vec<_>>(),
      vec!["envs", "image", "name", "networksAdvanced", "ports"]
    );

    let ports = properties["ports"].resolve().await.unwrap().unwrap();
    assert_eq!(ports.to_string(), r#"[{"external":27017.0,"internal":27017.0}]"#);

    let networks = properties["networksAdvanced"].resolve().await.unwrap().unwrap();
    assert_eq!(networks.to_string(), r#"[{"aliases":["mongo"],"name":"services-dev"}]"#);
  }

  #[test]
  fn empty_collections_are_omitted() {
    let properties = ContainerArgs {
      name: Some(Output::from("bare")),
      ..ContainerArgs::default()
    }
    .into_properties();
    assert_eq!(properties.keys().collect::<Vec<_>>(), vec!["name"]);
  }
}
