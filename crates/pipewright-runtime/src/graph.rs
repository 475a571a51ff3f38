//! Dependency graph built from captured output references.
//!
//! Execution never walks this graph: ordering emerges from inputs awaiting
//! outputs. The graph exists to reject wiring that could never finish (a
//! cycle deadlocks) and to render a pipeline for inspection.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::error::RuntimeError;

/// Producer → consumer edges between named nodes.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
  /// Nodes in declaration order.
  nodes: Vec<String>,
  /// Adjacency list: node -> downstream nodes.
  adjacency: HashMap<String, Vec<String>>,
  /// Reverse adjacency: node -> upstream nodes.
  reverse_adjacency: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
  /// Build a graph from nodes and `(producer, consumer)` edges.
  ///
  /// Duplicate edges are collapsed.
  pub fn new(nodes: Vec<String>, edges: &[(String, String)]) -> Self {
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node in &nodes {
      adjacency.entry(node.clone()).or_default();
      reverse_adjacency.entry(node.clone()).or_default();
    }

    for (from, to) in edges {
      let downstream = adjacency.entry(from.clone()).or_default();
      if downstream.contains(to) {
        continue;
      }
      downstream.push(to.clone());
      reverse_adjacency
        .entry(to.clone())
        .or_default()
        .push(from.clone());
    }

    Self {
      nodes,
      adjacency,
      reverse_adjacency,
    }
  }

  pub fn nodes(&self) -> &[String] {
    &self.nodes
  }

  /// Nodes that wait on nothing.
  pub fn entry_points(&self) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|n| self.upstream(n).is_empty())
      .map(String::as_str)
      .collect()
  }

  pub fn downstream(&self, node: &str) -> &[String] {
    self
      .adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn upstream(&self, node: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Nodes ordered so every producer precedes its consumers.
  ///
  /// Ties keep declaration order. Fails with the nodes of one cycle.
  pub fn topological_order(&self) -> Result<Vec<&str>, RuntimeError> {
    let mut in_degree: HashMap<&str, usize> = self
      .nodes
      .iter()
      .map(|n| (n.as_str(), self.upstream(n).len()))
      .collect();

    let mut order = Vec::with_capacity(self.nodes.len());
    let mut placed: HashSet<&str> = HashSet::new();

    while order.len() < self.nodes.len() {
      let next = self
        .nodes
        .iter()
        .map(String::as_str)
        .find(|n| !placed.contains(n) && in_degree.get(n) == Some(&0));

      let Some(node) = next else {
        let cycle = self.find_cycle().unwrap_or_default();
        return Err(RuntimeError::configuration(format!(
          "dependency cycle: {}",
          cycle.join(" -> ")
        )));
      };

      placed.insert(node);
      order.push(node);
      for down in self.downstream(node) {
        if let Some(degree) = in_degree.get_mut(down.as_str()) {
          *degree = degree.saturating_sub(1);
        }
      }
    }

    Ok(order)
  }

  /// One cycle as a closed path (first node repeated at the end), if any.
  pub fn find_cycle(&self) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
      Visiting,
      Done,
    }

    fn visit<'a>(
      graph: &'a DependencyGraph,
      node: &'a str,
      marks: &mut HashMap<&'a str, Mark>,
      path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
      match marks.get(node) {
        Some(Mark::Done) => return None,
        Some(Mark::Visiting) => {
          let start = path.iter().position(|n| *n == node).unwrap_or(0);
          let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
          cycle.push(node.to_string());
          return Some(cycle);
        }
        None => {}
      }

      marks.insert(node, Mark::Visiting);
      path.push(node);
      for down in graph.downstream(node) {
        if let Some(cycle) = visit(graph, down, marks, path) {
          return Some(cycle);
        }
      }
      path.pop();
      marks.insert(node, Mark::Done);
      None
    }

    let mut marks = HashMap::new();
    let mut path = Vec::new();
    self
      .nodes
      .iter()
      .find_map(|n| visit(self, n, &mut marks, &mut path))
  }

  /// Render as a Graphviz digraph.
  pub fn to_dot(&self, name: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {:?} {{", name);
    for node in &self.nodes {
      let _ = writeln!(out, "  {:?};", node);
    }
    for node in &self.nodes {
      for down in self.downstream(node) {
        let _ = writeln!(out, "  {:?} -> {:?};", node, down);
      }
    }
    out.push_str("}\n");
    out
  }
}
