//! Resource dependency graph.
//!
//! [`GraphBuilder`] collects declared resources, then [`GraphBuilder::build`]
//! derives the edge set:
//!
//! - implicit edges, from the origin resources of every input property
//! - explicit edges, from `depends_on`
//!
//! Edges point from dependency to dependent. The result is verified to be
//! acyclic; on failure one concrete cycle is reported.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::resource::{ResourceId, ResourceNode};

/// Errors raised while declaring resources or building the graph.
///
/// All of them are construction-time errors: they surface before any
/// provider call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("duplicate resource: {0}")]
  DuplicateIdentity(ResourceId),

  #[error("dependency cycle detected: {}", format_path(.path))]
  CycleDetected { path: Vec<ResourceId> },

  #[error("{resource} depends on {dependency}, which is not declared in this stack")]
  UnknownDependency {
    resource: ResourceId,
    dependency: ResourceId,
  },
}

fn format_path(path: &[ResourceId]) -> String {
  path.iter().map(|id| id.name.as_str()).collect::<Vec<_>>().join(" -> ")
}

/// How an edge was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
  /// An input property is derived from the dependency's output.
  Implicit,
  /// Declared through `depends_on`.
  Explicit,
}

impl fmt::Display for EdgeKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EdgeKind::Implicit => write!(f, "implicit"),
      EdgeKind::Explicit => write!(f, "explicit"),
    }
  }
}

/// Collects resource declarations for one stack.
#[derive(Debug, Default)]
pub struct GraphBuilder {
  nodes: Vec<ResourceNode>,
  index: HashMap<ResourceId, usize>,
}

impl GraphBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a node.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateIdentity` if a node with the same type token and name
  /// is already registered.
  pub fn declare(&mut self, node: ResourceNode) -> Result<(), GraphError> {
    if self.index.contains_key(&node.id) {
      return Err(GraphError::DuplicateIdentity(node.id.clone()));
    }
    self.index.insert(node.id.clone(), self.nodes.len());
    self.nodes.push(node);
    Ok(())
  }

  pub fn contains(&self, id: &ResourceId) -> bool {
    self.index.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Derive the edge set and verify it is acyclic.
  pub fn build(self) -> Result<ResourceGraph, GraphError> {
    let mut graph = DiGraph::new();

    // Node indices follow declaration order so they line up with `nodes`.
    for node in &self.nodes {
      graph.add_node(node.id.clone());
    }

    for (i, node) in self.nodes.iter().enumerate() {
      let dependent = NodeIndex::new(i);

      for dep in node.implicit_dependencies() {
        let from = self.lookup(&node.id, &dep)?;
        graph.update_edge(from, dependent, EdgeKind::Implicit);
      }

      for dep in &node.depends_on {
        let from = self.lookup(&node.id, dep)?;
        // Explicit wins when both kinds apply
        graph.update_edge(from, dependent, EdgeKind::Explicit);
      }
    }

    let dag = ResourceGraph {
      graph,
      index: self.index,
      nodes: self.nodes,
    };

    dag.verify_acyclic()?;

    Ok(dag)
  }

  fn lookup(&self, resource: &ResourceId, dependency: &ResourceId) -> Result<NodeIndex, GraphError> {
    self
      .index
      .get(dependency)
      .map(|&i| NodeIndex::new(i))
      .ok_or_else(|| GraphError::UnknownDependency {
        resource: resource.clone(),
        dependency: dependency.clone(),
      })
  }
}

/// An immutable, acyclic graph of resource nodes ready for scheduling.
pub struct ResourceGraph {
  graph: DiGraph<ResourceId, EdgeKind>,
  index: HashMap<ResourceId, usize>,
  nodes: Vec<ResourceNode>,
}

impl ResourceGraph {
  fn verify_acyclic(&self) -> Result<(), GraphError> {
    match toposort(&self.graph, None) {
      Ok(_) => Ok(()),
      Err(cycle) => Err(GraphError::CycleDetected {
        path: self.cycle_through(cycle.node_id()),
      }),
    }
  }

  /// Find a path that leaves `start` and returns to it.
  ///
  /// The returned path begins and ends with `start`.
  fn cycle_through(&self, start: NodeIndex) -> Vec<ResourceId> {
    let successors = |idx: NodeIndex| -> Vec<NodeIndex> { self.graph.neighbors_directed(idx, Direction::Outgoing).collect() };

    let mut stack: Vec<(NodeIndex, Vec<NodeIndex>)> = vec![(start, successors(start))];
    let mut visited: HashSet<NodeIndex> = HashSet::from([start]);

    loop {
      let Some(frame) = stack.last_mut() else {
        break;
      };

      match frame.1.pop() {
        Some(next) if next == start => {
          let mut path: Vec<ResourceId> = stack.iter().map(|(idx, _)| self.graph[*idx].clone()).collect();
          path.push(self.graph[start].clone());
          return path;
        }
        Some(next) => {
          if visited.insert(next) {
            stack.push((next, successors(next)));
          }
        }
        None => {
          stack.pop();
        }
      }
    }

    vec![self.graph[start].clone()]
  }

  fn idx(&self, id: &ResourceId) -> Option<NodeIndex> {
    self.index.get(id).map(|&i| NodeIndex::new(i))
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Resource ids in declaration order.
  pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
    self.nodes.iter().map(|n| &n.id)
  }

  pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
    self.index.get(id).map(|&i| &self.nodes[i])
  }

  /// Direct dependencies of a resource.
  pub fn dependencies(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
    self.neighbors(id, Direction::Incoming)
  }

  /// Direct dependents of a resource.
  pub fn dependents(&self, id: &ResourceId) -> BTreeSet<ResourceId> {
    self.neighbors(id, Direction::Outgoing)
  }

  fn neighbors(&self, id: &ResourceId, direction: Direction) -> BTreeSet<ResourceId> {
    let Some(idx) = self.idx(id) else {
      return BTreeSet::new();
    };

    self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect()
  }

  /// Whether `to` directly depends on `from`.
  pub fn has_edge(&self, from: &ResourceId, to: &ResourceId) -> bool {
    self.edge_kind(from, to).is_some()
  }

  pub fn edge_kind(&self, from: &ResourceId, to: &ResourceId) -> Option<EdgeKind> {
    let (a, b) = (self.idx(from)?, self.idx(to)?);
    self.graph.find_edge(a, b).map(|e| self.graph[e])
  }

  /// All edges as `(dependency, dependent, kind)`, sorted.
  pub fn edges(&self) -> Vec<(ResourceId, ResourceId, EdgeKind)> {
    let mut edges: Vec<_> = self
      .graph
      .edge_indices()
      .filter_map(|e| {
        let (a, b) = self.graph.edge_endpoints(e)?;
        Some((self.graph[a].clone(), self.graph[b].clone(), self.graph[e]))
      })
      .collect();
    edges.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));
    edges
  }

  /// Resources in an order where dependencies come before dependents.
  pub fn topological_order(&self) -> Vec<ResourceId> {
    // The graph was verified acyclic on construction.
    toposort(&self.graph, None)
      .map(|order| order.into_iter().map(|idx| self.graph[idx].clone()).collect())
      .unwrap_or_default()
  }

  /// Group resources into levels: every resource's dependencies are in
  /// earlier levels.
  ///
  /// The executor does not run level by level; levels are for display.
  pub fn waves(&self) -> Vec<Vec<ResourceId>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let mut ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[*idx] == 0).copied().collect();

      if ready.is_empty() {
        break;
      }
      ready.sort();

      for idx in &ready {
        remaining.remove(idx);
        for neighbor in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&neighbor) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
    }

    waves
  }

  /// Split into the raw graph and node records for the executor.
  pub(crate) fn into_parts(self) -> (DiGraph<ResourceId, EdgeKind>, Vec<ResourceNode>) {
    (self.graph, self.nodes)
  }
}

impl fmt::Debug for ResourceGraph {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ResourceGraph")
      .field("nodes", &self.nodes.len())
      .field("edges", &self.graph.edge_count())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::Output;
  use crate::resource::{PropertyOutputs, Resource, ResourceOptions};
  use crate::value::Value;

  const CONTAINER: &str = "docker:index/container:Container";

  fn rid(name: &str) -> ResourceId {
    ResourceId::new(CONTAINER, name)
  }

  fn declare(builder: &mut GraphBuilder, name: &str, props: Vec<(&str, Output<Value>)>, options: ResourceOptions) -> Resource {
    let properties: PropertyOutputs = props.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    let (node, handle) = ResourceNode::declare(rid(name), properties, options);
    builder.declare(node).unwrap();
    handle
  }

  #[test]
  fn empty_graph() {
    let graph = GraphBuilder::new().build().unwrap();
    assert!(graph.is_empty());
    assert!(graph.waves().is_empty());
    assert!(graph.topological_order().is_empty());
  }

  #[test]
  fn duplicate_identity_is_rejected() {
    let mut builder = GraphBuilder::new();
    declare(&mut builder, "mongo", vec![], ResourceOptions::default());

    let (dup, _) = ResourceNode::declare(rid("mongo"), PropertyOutputs::new(), ResourceOptions::default());
    assert_eq!(builder.declare(dup), Err(GraphError::DuplicateIdentity(rid("mongo"))));

    // Same name under another type is a different identity
    let (other, _) = ResourceNode::declare(
      ResourceId::new("docker:index/network:Network", "mongo"),
      PropertyOutputs::new(),
      ResourceOptions::default(),
    );
    assert!(builder.declare(other).is_ok());
  }

  #[test]
  fn implicit_edges_follow_property_origins() {
    let mut builder = GraphBuilder::new();
    let image = declare(&mut builder, "image", vec![], ResourceOptions::default());
    let network = declare(&mut builder, "network", vec![], ResourceOptions::default());

    let networks = Output::array(vec![Output::object(vec![("name".to_string(), network.output("name"))])]);
    declare(
      &mut builder,
      "mongo",
      vec![("image", image.output("repoDigest")), ("networksAdvanced", networks)],
      ResourceOptions::default(),
    );

    let graph = builder.build().unwrap();
    assert_eq!(graph.edge_kind(&rid("image"), &rid("mongo")), Some(EdgeKind::Implicit));
    assert_eq!(graph.edge_kind(&rid("network"), &rid("mongo")), Some(EdgeKind::Implicit));
    assert_eq!(graph.dependencies(&rid("mongo")), BTreeSet::from([rid("image"), rid("network")]));
    assert!(!graph.has_edge(&rid("image"), &rid("network")));
  }

  #[test]
  fn explicit_edges_are_merged_with_implicit() {
    let mut builder = GraphBuilder::new();
    let mongo = declare(&mut builder, "mongo", vec![], ResourceOptions::default());
    declare(
      &mut builder,
      "backend",
      vec![("name", Output::from("backend-dev"))],
      ResourceOptions::default().depends_on(&mongo),
    );
    declare(
      &mut builder,
      "both",
      vec![("host", mongo.output("name"))],
      ResourceOptions::default().depends_on(&mongo),
    );

    let graph = builder.build().unwrap();
    assert_eq!(graph.edge_kind(&rid("mongo"), &rid("backend")), Some(EdgeKind::Explicit));
    assert_eq!(graph.edge_kind(&rid("mongo"), &rid("both")), Some(EdgeKind::Explicit));
    assert_eq!(graph.edges().len(), 2);
    assert_eq!(graph.dependents(&rid("mongo")), BTreeSet::from([rid("backend"), rid("both")]));
  }

  #[test]
  fn literal_strings_create_no_edges() {
    // Interpolating a naming convention is not a data dependency.
    let mut builder = GraphBuilder::new();
    declare(&mut builder, "backend", vec![], ResourceOptions::default());
    declare(
      &mut builder,
      "frontend",
      vec![("env", Output::from(format!("HTTP_PROXY=backend-{}:{}", "dev", 3000)))],
      ResourceOptions::default(),
    );

    let graph = builder.build().unwrap();
    assert!(graph.edges().is_empty());
    assert_eq!(graph.waves().len(), 1);
  }

  #[test]
  fn two_node_cycle_is_reported_with_path() {
    let mut builder = GraphBuilder::new();
    // b waits for a explicitly; a consumes b's output
    let b = declare(&mut builder, "b", vec![], ResourceOptions::default().depends_on_id(rid("a")));
    declare(&mut builder, "a", vec![("from_b", b.output("id"))], ResourceOptions::default());

    match builder.build() {
      Err(GraphError::CycleDetected { path }) => {
        assert_eq!(path.len(), 3);
        assert_eq!(path.first(), path.last());
        let names: HashSet<_> = path.iter().map(|id| id.name.as_str()).collect();
        assert_eq!(names, HashSet::from(["a", "b"]));
      }
      other => panic!("expected CycleDetected, got {:?}", other.map(|_| ())),
    }
  }

  #[test]
  fn self_reference_is_a_cycle() {
    let mut builder = GraphBuilder::new();
    let (mut node, handle) = ResourceNode::declare(rid("loop"), PropertyOutputs::new(), ResourceOptions::default());
    node.properties.insert("me".to_string(), handle.output("id"));
    builder.declare(node).unwrap();

    let err = builder.build().unwrap_err();
    assert_eq!(
      err,
      GraphError::CycleDetected {
        path: vec![rid("loop"), rid("loop")]
      }
    );
    assert_eq!(err.to_string(), "dependency cycle detected: loop -> loop");
  }

  #[test]
  fn undeclared_dependency_is_rejected() {
    let mut builder = GraphBuilder::new();
    declare(&mut builder, "backend", vec![], ResourceOptions::default().depends_on_id(rid("ghost")));

    assert_eq!(
      builder.build().unwrap_err(),
      GraphError::UnknownDependency {
        resource: rid("backend"),
        dependency: rid("ghost"),
      }
    );
  }

  #[test]
  fn waves_and_topological_order_for_diamond() {
    //     a
    //    / \
    //   b   c
    //    \ /
    //     d
    let mut builder = GraphBuilder::new();
    let a = declare(&mut builder, "a", vec![], ResourceOptions::default());
    let b = declare(&mut builder, "b", vec![("a", a.output("id"))], ResourceOptions::default());
    let c = declare(&mut builder, "c", vec![("a", a.output("id"))], ResourceOptions::default());
    declare(
      &mut builder,
      "d",
      vec![("b", b.output("id")), ("c", c.output("id"))],
      ResourceOptions::default(),
    );

    let graph = builder.build().unwrap();

    let topo = graph.topological_order();
    let pos = |name: &str| topo.iter().position(|id| id.name == name).unwrap();
    assert!(pos("a") < pos("b"));
    assert!(pos("a") < pos("c"));
    assert!(pos("b") < pos("d"));
    assert!(pos("c") < pos("d"));

    let waves = graph.waves();
    assert_eq!(waves, vec![vec![rid("a")], vec![rid("b"), rid("c")], vec![rid("d")]]);
  }
}
