//! Built-in stack programs.
//!
//! A program declares resources and exports against a [`Stack`]. It runs
//! once per deployment, before execution starts; it never awaits outputs.

pub mod docker;
mod services;
mod shop;

use crate::stack::{Stack, StackError};

pub use services::Services;
pub use shop::Shop;

/// Declares one stack's resources and exports.
pub trait Program: Send + Sync {
  fn name(&self) -> &'static str;

  /// Project the program's stacks belong to.
  fn project(&self) -> &'static str {
    self.name()
  }

  fn run(&self, stack: &mut Stack) -> Result<(), StackError>;
}

/// Names of the built-in programs.
pub const BUILTIN: &[&str] = &["services", "shop"];

/// Look up a built-in program by name.
pub fn builtin(name: &str) -> Option<Box<dyn Program>> {
  match name {
    "services" => Some(Box::new(Services)),
    "shop" => Some(Box::new(Shop)),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_builtin_resolves() {
    for name in BUILTIN {
      let program = builtin(name).unwrap();
      assert_eq!(program.name(), *name);
      assert_eq!(program.project(), *name);
    }
    assert!(builtin("nope").is_none());
  }
}
