//! Resource providers.
//!
//! A provider performs the side effect behind a resource: it receives the
//! resource's fully resolved input properties and returns the properties it
//! produced. Providers are looked up by kind, which defaults to the package
//! segment of the resource's type token (`docker` for
//! `docker:index/network:Network`).

mod echo;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::resource::ResourceId;
use crate::value::PropertyMap;

pub use echo::EchoProvider;

/// A resource operation handed to a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
  pub id: ResourceId,
  /// Input properties with every output resolved.
  pub properties: PropertyMap,
}

/// Failure reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
  pub message: String,
}

impl ProviderError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Applies resources of one kind.
#[async_trait]
pub trait Provider: Send + Sync {
  /// Create or update the resource and return the properties it produced.
  async fn apply(&self, request: &ApplyRequest) -> Result<PropertyMap, ProviderError>;
}

/// Providers by kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
  providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `provider` for `kind`, replacing any previous one.
  pub fn register(&mut self, kind: impl Into<String>, provider: Arc<dyn Provider>) {
    self.providers.insert(kind.into(), provider);
  }

  pub fn with(mut self, kind: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
    self.register(kind, provider);
    self
  }

  pub fn get(&self, kind: &str) -> Option<Arc<dyn Provider>> {
    self.providers.get(kind).cloned()
  }

  pub fn contains(&self, kind: &str) -> bool {
    self.providers.contains_key(kind)
  }
}

impl fmt::Debug for ProviderRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut kinds: Vec<_> = self.providers.keys().collect();
    kinds.sort();
    f.debug_struct("ProviderRegistry").field("kinds", &kinds).finish()
  }
}
