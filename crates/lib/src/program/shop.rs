use super::Program;
use super::services::Services;
use crate::stack::{Stack, StackError};

/// Re-exports the services stack's `url` as `shopUrl`.
///
/// Required config: `org`, the organization that owns the services stack.
/// The referenced stack has the same short name as this one.
#[derive(Debug, Default)]
pub struct Shop;

impl Program for Shop {
  fn name(&self) -> &'static str {
    "shop"
  }

  fn run(&self, stack: &mut Stack) -> Result<(), StackError> {
    let org = stack.config().require_str("org")?;
    let services = stack.stack_reference(&format!("{}/{}/{}", org, Services.project(), stack.stack()))?;
    stack.export("shopUrl", services.get_output("url"));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::config::{Config, ConfigError};
  use crate::output::OutputError;
  use crate::stack::StackReferenceError;
  use crate::state::{ExportEntry, ExportMap, MemoryBackend};
  use crate::value::Value;

  fn shop_stack(config: Config, backend: MemoryBackend) -> Stack {
    Stack::new("acme/shop/dev".parse().unwrap(), config, Arc::new(backend))
  }

  #[tokio::test]
  async fn exports_services_url() {
    let mut exports = ExportMap::new();
    exports.insert("url".to_string(), ExportEntry::new("http://localhost:3001"));
    let backend = MemoryBackend::new().with_stack("acme/services/dev".parse().unwrap(), exports);

    let mut config = Config::new("shop");
    config.set("org", "acme");
    let mut stack = shop_stack(config, backend);
    Shop.run(&mut stack).unwrap();

    let url = stack.exports().get("shopUrl").unwrap();
    assert_eq!(url.resolve().await, Ok(Some(Value::from("http://localhost:3001"))));
    assert_eq!(stack.resource_count(), 0);
  }

  #[tokio::test]
  async fn undeployed_services_fail_the_export() {
    let mut config = Config::new("shop");
    config.set("org", "acme");
    let mut stack = shop_stack(config, MemoryBackend::new());
    Shop.run(&mut stack).unwrap();

    let url = stack.exports().get("shopUrl").unwrap();
    assert_eq!(
      url.resolve().await,
      Err(OutputError::StackReference(StackReferenceError::UnknownStack(
        "acme/services/dev".parse().unwrap()
      )))
    );
  }

  #[test]
  fn org_is_required() {
    let mut stack = shop_stack(Config::new("shop"), MemoryBackend::new());
    assert!(matches!(
      Shop.run(&mut stack),
      Err(StackError::Config(ConfigError::Missing { ref key })) if key == "org"
    ));
  }
}
