//! stackweave-lib: resource graph and output propagation engine
//!
//! This crate provides the building blocks of a stack deployment:
//! - `Output`: asynchronously resolved, possibly secret, values
//! - `Resource`: declared infrastructure with typed identity and inputs
//! - `GraphBuilder`: discovers dependency edges and rejects cycles
//! - `execute`: applies a graph concurrently in dependency order
//! - `StackReference`: reads another stack's persisted exports

pub mod config;
pub mod execute;
pub mod graph;
pub mod output;
pub mod program;
pub mod provider;
pub mod resource;
pub mod stack;
pub mod state;
pub mod util;
pub mod value;
