use std::time::Duration;

use thiserror::Error;

use crate::resource::ResourceId;
use crate::stack::StackReferenceError;

/// The cause carried by a failed [`Output`](super::Output).
///
/// Causes are cloned, never wrapped, as they travel to downstream outputs so
/// that a consumer always sees the node where the failure originated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OutputError {
  /// The provider rejected the resource.
  #[error("{resource} failed: {message}")]
  ResourceFailed { resource: ResourceId, message: String },

  /// The provider did not answer within the operation timeout.
  #[error("{resource} timed out after {after:?}")]
  Timeout { resource: ResourceId, after: Duration },

  /// Execution was cancelled before the resource was applied.
  #[error("{resource} was not applied: execution cancelled")]
  Cancelled { resource: ResourceId },

  /// The resource applied but did not produce the requested property.
  #[error("{resource} has no output property '{property}'")]
  MissingProperty { resource: ResourceId, property: String },

  /// A value from another stack could not be read.
  #[error(transparent)]
  StackReference(#[from] StackReferenceError),

  /// The producer of a deferred output went away without settling it.
  #[error("output was dropped before it resolved")]
  Abandoned,

  /// A failure raised by program code.
  #[error("{0}")]
  Custom(String),
}

impl OutputError {
  /// The resource the failure originated from, if any.
  pub fn origin(&self) -> Option<&ResourceId> {
    match self {
      OutputError::ResourceFailed { resource, .. }
      | OutputError::Timeout { resource, .. }
      | OutputError::Cancelled { resource }
      | OutputError::MissingProperty { resource, .. } => Some(resource),
      OutputError::StackReference(_) | OutputError::Abandoned | OutputError::Custom(_) => None,
    }
  }
}
