use super::Program;
use super::docker::{
  Container, ContainerArgs, ContainerPort, Network, NetworkArgs, NetworkAttachment, RemoteImage, RemoteImageArgs,
};
use crate::output::Output;
use crate::resource::ResourceOptions;
use crate::stack::{Stack, StackError};

const BACKEND_IMAGE: &str = "pulumi/tutorial-pulumi-fundamentals-backend:latest";
const FRONTEND_IMAGE: &str = "pulumi/tutorial-pulumi-fundamentals-frontend:latest";
const MONGO_IMAGE: &str = "pulumi/tutorial-pulumi-fundamentals-database-local:latest";

/// MongoDB, a backend and a frontend on a shared network.
///
/// Required config: `frontendPort`, `backendPort`, `mongoPort`, `mongoHost`,
/// `database`, `nodeEnvironment`, `protocol`.
///
/// The frontend reaches the backend through the `backend-<stack>` alias in
/// its `HTTP_PROXY` env entry, which is a plain string. There is no edge from
/// backend to frontend, so the two containers may start in either order.
#[derive(Debug, Default)]
pub struct Services;

impl Program for Services {
  fn name(&self) -> &'static str {
    "services"
  }

  fn run(&self, stack: &mut Stack) -> Result<(), StackError> {
    let config = stack.config();
    let frontend_port = config.require_f64("frontendPort")?;
    let backend_port = config.require_f64("backendPort")?;
    let mongo_port = config.require_f64("mongoPort")?;
    let mongo_host = config.require_str("mongoHost")?;
    let database = config.require_str("database")?;
    let node_environment = config.require_str("nodeEnvironment")?;
    let protocol = config.require_str("protocol")?;
    let env = stack.stack().to_string();

    let backend_image = RemoteImage::new(
      stack,
      "backend-image",
      RemoteImageArgs {
        name: Output::from(BACKEND_IMAGE),
      },
      ResourceOptions::default(),
    )?;
    stack.export("backendDockerImage", backend_image.name());

    let frontend_image = RemoteImage::new(
      stack,
      "frontend-image",
      RemoteImageArgs {
        name: Output::from(FRONTEND_IMAGE),
      },
      ResourceOptions::default(),
    )?;
    stack.export("frontendDockerImage", frontend_image.name());

    let mongo_image = RemoteImage::new(
      stack,
      "mongo-image",
      RemoteImageArgs {
        name: Output::from(MONGO_IMAGE),
      },
      ResourceOptions::default(),
    )?;
    stack.export("mongoDockerImage", mongo_image.name());

    let network = Network::new(
      stack,
      "network",
      NetworkArgs {
        name: Output::from(format!("services-{}", env)),
      },
      ResourceOptions::default(),
    )?;
    stack.export("containerNetwork", network.name());

    let mongo = Container::new(
      stack,
      "mongo-container",
      ContainerArgs {
        name: Some(Output::from(format!("mongo-{}", env))),
        image: Some(mongo_image.repo_digest()),
        ports: vec![ContainerPort::same(mongo_port)],
        networks_advanced: vec![NetworkAttachment {
          name: network.name(),
          aliases: vec![Output::from("mongo")],
        }],
        ..ContainerArgs::default()
      },
      ResourceOptions::default(),
    )?;

    Container::new(
      stack,
      "backend-container",
      ContainerArgs {
        name: Some(Output::from(format!("backend-{}", env))),
        image: Some(backend_image.repo_digest()),
        ports: vec![ContainerPort::same(backend_port)],
        envs: vec![
          Output::from(format!("DATABASE_HOST={}", mongo_host)),
          Output::from(format!("DATABASE_NAME={}", database)),
          Output::from(format!("NODE_ENV={}", node_environment)),
        ],
        networks_advanced: vec![NetworkAttachment {
          name: network.name(),
          aliases: vec![Output::from(format!("backend-{}", env))],
        }],
      },
      ResourceOptions::default().depends_on(mongo.resource()),
    )?;

    Container::new(
      stack,
      "frontend-container",
      ContainerArgs {
        name: Some(Output::from(format!("frontend-{}", env))),
        image: Some(frontend_image.repo_digest()),
        ports: vec![ContainerPort::same(frontend_port)],
        envs: vec![
          Output::from(format!("PORT={}", frontend_port)),
          Output::from(format!("HTTP_PROXY=backend-{}:{}", env, backend_port)),
          Output::from(format!("PROXY_PROTOCOL={}", protocol)),
        ],
        networks_advanced: vec![NetworkAttachment {
          name: network.name(),
          aliases: vec![Output::from(format!("frontend-{}", env))],
        }],
      },
      ResourceOptions::default(),
    )?;

    stack.export("url", Output::from(format!("{}localhost:{}", protocol, frontend_port)));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::{Config, ConfigError};
  use crate::graph::EdgeKind;
  use crate::program::docker::{CONTAINER, NETWORK, REMOTE_IMAGE};
  use crate::resource::ResourceId;
  use crate::state::MemoryBackend;

  fn services_config() -> Config {
    let mut config = Config::new("services");
    config.set("frontendPort", 3001.0);
    config.set("backendPort", 3000.0);
    config.set("mongoPort", 27017.0);
    config.set("mongoHost", "mongodb://mongo:27017");
    config.set("database", "cart");
    config.set("nodeEnvironment", "development");
    config.set("protocol", "http://");
    config
  }

  fn container(name: &str) -> ResourceId {
    ResourceId::new(CONTAINER, name)
  }

  #[test]
  fn graph_has_expected_edges() {
    let mut stack = Stack::new(
      "acme/services/dev".parse().unwrap(),
      services_config(),
      Arc::new(MemoryBackend::new()),
    );
    Services.run(&mut stack).unwrap();
    assert_eq!(stack.resource_count(), 7);

    let (_, builder, exports, _) = stack.into_parts();
    let graph = builder.build().unwrap();
    let network = ResourceId::new(NETWORK, "network");
    let mongo_image = ResourceId::new(REMOTE_IMAGE, "mongo-image");

    assert_eq!(
      graph.edge_kind(&mongo_image, &container("mongo-container")),
      Some(EdgeKind::Implicit)
    );
    for name in ["mongo-container", "backend-container", "frontend-container"] {
      assert!(graph.has_edge(&network, &container(name)), "network -> {name}");
    }
    assert_eq!(
      graph.edge_kind(&container("mongo-container"), &container("backend-container")),
      Some(EdgeKind::Explicit)
    );
    assert!(!graph.has_edge(&container("backend-container"), &container("frontend-container")));

    let names: Vec<_> = exports.names().collect();
    assert_eq!(
      names,
      vec![
        "backendDockerImage",
        "containerNetwork",
        "frontendDockerImage",
        "mongoDockerImage",
        "url"
      ]
    );
  }

  #[test]
  fn missing_config_is_reported() {
    let mut config = services_config();
    config.set("mongoPort", "not-a-port");
    let mut stack = Stack::new(
      "acme/services/dev".parse().unwrap(),
      config,
      Arc::new(MemoryBackend::new()),
    );
    let err = Services.run(&mut stack).unwrap_err();
    assert!(matches!(
      err,
      StackError::Config(ConfigError::InvalidNumber { ref key, .. }) if key == "mongoPort"
    ));

    let mut stack = Stack::new(
      "acme/services/dev".parse().unwrap(),
      Config::new("services"),
      Arc::new(MemoryBackend::new()),
    );
    assert!(matches!(
      Services.run(&mut stack),
      Err(StackError::Config(ConfigError::Missing { .. }))
    ));
  }
}
