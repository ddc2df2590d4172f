//! A local provider that performs no side effects.
//!
//! It echoes the request back and synthesizes the handful of properties real
//! providers compute: a stable `id` for every resource and a `repoDigest` for
//! remote images. Lets programs run end to end without a container runtime.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ApplyRequest, Provider, ProviderError};
use crate::util::hash::{hash_bytes, hash_json};
use crate::value::{PropertyMap, Value};

/// Deterministic provider for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct EchoProvider {
  delay: Option<Duration>,
  fail_on: BTreeSet<String>,
}

impl EchoProvider {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sleep this long inside every apply.
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Fail any resource whose logical name is in `names`.
  pub fn fail_on<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fail_on.extend(names.into_iter().map(Into::into));
    self
  }
}

#[async_trait]
impl Provider for EchoProvider {
  async fn apply(&self, request: &ApplyRequest) -> Result<PropertyMap, ProviderError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    if self.fail_on.contains(&request.id.name) {
      return Err(ProviderError::new(format!("injected failure for '{}'", request.id.name)));
    }

    let digest = hash_json(&request.properties).map_err(|e| ProviderError::new(e.to_string()))?;

    let mut produced = PropertyMap::new();
    produced.insert(
      "id".to_string(),
      Value::from(format!("{}-{}", request.id.name, digest.short())),
    );

    if request.id.type_token.ends_with(":RemoteImage") {
      let image = request
        .properties
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::new("remote image requires a 'name' property"))?;
      let repo_digest = format!("{}@sha256:{}", image, hash_bytes(image.as_bytes()));
      produced.insert("repoDigest".to_string(), Value::from(repo_digest));
    }

    debug!(resource = %request.id, produced = produced.len(), "echo provider applied");
    Ok(produced)
  }
}
