//! Hashing utilities.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `ShortHash`: a 12-character prefix used for synthesized resource ids
//! - `hash_bytes()` and `hash_json()`

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a [`ShortHash`].
pub const SHORT_HASH_LEN: usize = 12;

pub type HashError = serde_json::Error;

/// A full 64-character SHA-256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Truncate to a [`ShortHash`].
  ///
  /// A hash shorter than [`SHORT_HASH_LEN`] is kept whole.
  pub fn short(&self) -> ShortHash {
    ShortHash(self.0.get(..SHORT_HASH_LEN).unwrap_or(&self.0).to_string())
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A truncated hash, readable enough for identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShortHash(pub String);

impl std::fmt::Display for ShortHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Compute SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Hash the JSON serialization of a value.
///
/// Maps serialize with sorted keys, so equal property maps hash equally.
pub fn hash_json<T: Serialize + ?Sized>(value: &T) -> Result<ContentHash, HashError> {
  let serialized = serde_json::to_string(value)?;
  Ok(hash_bytes(serialized.as_bytes()))
}
