#![forbid(unsafe_code, missing_docs)]

//! Directed acyclic graph for task dependency planning.
//!
//! An edge `(src, dst)` means "`src` requires `dst`". The graph stays acyclic
//! at all times: [`Graph::add_edge`] is the only operation that could close a
//! cycle, and it refuses to with [`Error::CycleDetected`]. Because planning
//! happens once per execution, the graph does not maintain an incremental
//! topological order; [`Graph::topological_order`] computes one on demand.
//!
//! Node and edge iteration follows insertion order, making plans that are
//! built from this graph deterministic.

use std::collections::VecDeque;

use hashlink::{LinkedHashMap, LinkedHashSet};
use slotmap::{DefaultKey, SlotMap};

/// A node (identifier) in a [`Graph`].
///
/// Only meaningful to the [`Graph`] that created it; a key carried over to
/// another graph may alias an unrelated node there.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Node(DefaultKey);

/// Error produced by [`Graph::add_edge`].
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
pub enum Error {
  /// The edge would make its destination reach its source, closing a cycle.
  #[error("adding the edge would create a cycle")]
  CycleDetected,
  /// The source or destination node does not exist in this graph.
  #[error("node does not exist in this graph")]
  NodeMissing,
}

#[derive(Debug)]
struct NodeInfo<N, E> {
  data: N,
  /// Outgoing edges: the nodes this node requires, with edge data.
  outgoing: LinkedHashMap<Node, E>,
  /// Incoming edges: the nodes that require this node.
  incoming: LinkedHashSet<Node>,
}

/// Directed acyclic graph with node data `N` and edge data `E`.
#[derive(Debug)]
pub struct Graph<N, E> {
  nodes: SlotMap<DefaultKey, NodeInfo<N, E>>,
  /// Node insertion order, so traversals do not depend on slot reuse.
  order: Vec<Node>,
}

impl<N, E> Default for Graph<N, E> {
  #[inline]
  fn default() -> Self {
    Self { nodes: SlotMap::new(), order: Vec::new() }
  }
}

impl<N, E> Graph<N, E> {
  /// Creates an empty graph.
  #[inline]
  pub fn new() -> Self { Self::default() }

  /// Returns the number of nodes.
  #[inline]
  pub fn len(&self) -> usize { self.nodes.len() }

  /// Returns `true` if the graph has no nodes.
  #[inline]
  pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

  /// Adds a node with `data`, returning its identifier.
  pub fn add_node(&mut self, data: N) -> Node {
    let node = Node(self.nodes.insert(NodeInfo {
      data,
      outgoing: LinkedHashMap::new(),
      incoming: LinkedHashSet::new(),
    }));
    self.order.push(node);
    node
  }

  /// Returns `true` if `node` exists in this graph.
  #[inline]
  pub fn contains_node(&self, node: Node) -> bool {
    self.nodes.contains_key(node.0)
  }

  /// Gets the data of `node`, or `None` if it does not exist.
  #[inline]
  pub fn node_data(&self, node: Node) -> Option<&N> {
    self.nodes.get(node.0).map(|info| &info.data)
  }

  /// Gets the data of `node` mutably, or `None` if it does not exist.
  #[inline]
  pub fn node_data_mut(&mut self, node: Node) -> Option<&mut N> {
    self.nodes.get_mut(node.0).map(|info| &mut info.data)
  }

  /// Returns all nodes in insertion order.
  #[inline]
  pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
    self.order.iter().copied()
  }

  /// Adds an edge from `src` to `dst` with `data`, meaning `src` requires
  /// `dst`.
  ///
  /// Adding an edge that already exists replaces its data. Returns
  /// [`Error::CycleDetected`] if the edge would close a cycle, or
  /// [`Error::NodeMissing`] if either node does not exist; the graph is
  /// unchanged in both cases.
  pub fn add_edge(&mut self, src: Node, dst: Node, data: E) -> Result<(), Error> {
    if !self.contains_node(src) || !self.contains_node(dst) {
      return Err(Error::NodeMissing);
    }
    // A self-edge, or a path from dst back to src, would close a cycle.
    if src == dst || self.reaches(dst, src) {
      return Err(Error::CycleDetected);
    }
    self.nodes[src.0].outgoing.insert(dst, data);
    self.nodes[dst.0].incoming.insert(src);
    Ok(())
  }

  /// Returns `true` if an edge from `src` to `dst` exists.
  #[inline]
  pub fn contains_edge(&self, src: Node, dst: Node) -> bool {
    self.nodes.get(src.0).is_some_and(|info| info.outgoing.contains_key(&dst))
  }

  /// Gets the data of the edge from `src` to `dst`, if it exists.
  #[inline]
  pub fn edge_data(&self, src: Node, dst: Node) -> Option<&E> {
    self.nodes.get(src.0).and_then(|info| info.outgoing.get(&dst))
  }

  /// Returns the nodes `src` requires, with edge data, in insertion order.
  pub fn targets(&self, src: Node) -> impl Iterator<Item = (Node, &E)> + '_ {
    self.nodes.get(src.0)
      .into_iter()
      .flat_map(|info| info.outgoing.iter().map(|(node, data)| (*node, data)))
  }

  /// Returns the nodes that require `dst`, in insertion order.
  pub fn sources(&self, dst: Node) -> impl Iterator<Item = Node> + '_ {
    self.nodes.get(dst.0)
      .into_iter()
      .flat_map(|info| info.incoming.iter().copied())
  }

  /// Returns `true` if `dst` is reachable from `src` over outgoing edges,
  /// including when `src == dst`.
  pub fn reaches(&self, src: Node, dst: Node) -> bool {
    if !self.contains_node(src) || !self.contains_node(dst) {
      return false;
    }
    let mut stack = vec![src];
    let mut visited = LinkedHashSet::new();
    while let Some(node) = stack.pop() {
      if node == dst {
        return true;
      }
      if !visited.insert(node) {
        continue;
      }
      stack.extend(self.nodes[node.0].outgoing.keys().copied());
    }
    false
  }

  /// Computes a topological order over all nodes: every node appears after
  /// the nodes it requires.
  ///
  /// The order is deterministic given the same sequence of node and edge
  /// insertions.
  pub fn topological_order(&self) -> Vec<Node> {
    // Kahn's algorithm over unsatisfied-requirement counts. The graph is
    // acyclic by construction, so every node gets emitted.
    let mut unsatisfied: LinkedHashMap<Node, usize> = self.order.iter()
      .map(|node| (*node, self.nodes[node.0].outgoing.len()))
      .collect();
    let mut queue: VecDeque<Node> = self.order.iter().copied()
      .filter(|node| matches!(unsatisfied.get(node), Some(0)))
      .collect();
    let mut sorted = Vec::with_capacity(self.len());
    while let Some(node) = queue.pop_front() {
      sorted.push(node);
      for source in self.nodes[node.0].incoming.iter() {
        let count = unsatisfied.get_mut(source).expect("source node in count map");
        *count -= 1;
        if *count == 0 {
          queue.push_back(*source);
        }
      }
    }
    debug_assert_eq!(sorted.len(), self.len(), "graph contained a cycle");
    sorted
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn position(order: &[Node], node: Node) -> usize {
    order.iter().position(|n| *n == node).expect("node in order")
  }

  #[test]
  fn add_node_and_data() {
    let mut graph = Graph::<&str, ()>::new();
    assert!(graph.is_empty());
    let node = graph.add_node("a");
    assert!(graph.contains_node(node));
    assert_eq!(graph.node_data(node), Some(&"a"));
    assert_eq!(graph.len(), 1);
  }

  #[test]
  fn add_edge_and_query() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    let b = graph.add_node("b");
    graph.add_edge(a, b, 1).unwrap();
    assert!(graph.contains_edge(a, b));
    assert!(!graph.contains_edge(b, a));
    assert_eq!(graph.edge_data(a, b), Some(&1));
    assert_eq!(graph.targets(a).collect::<Vec<_>>(), vec![(b, &1)]);
    assert_eq!(graph.sources(b).collect::<Vec<_>>(), vec![a]);
  }

  #[test]
  fn self_edge_is_cycle() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    assert_eq!(graph.add_edge(a, a, ()), Err(Error::CycleDetected));
  }

  #[test]
  fn two_node_cycle_rejected() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    let b = graph.add_node("b");
    graph.add_edge(a, b, ()).unwrap();
    assert_eq!(graph.add_edge(b, a, ()), Err(Error::CycleDetected));
    // The graph must be unchanged by the rejected edge.
    assert!(!graph.contains_edge(b, a));
  }

  #[test]
  fn transitive_cycle_rejected() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    let b = graph.add_node("b");
    let c = graph.add_node("c");
    graph.add_edge(a, b, ()).unwrap();
    graph.add_edge(b, c, ()).unwrap();
    assert_eq!(graph.add_edge(c, a, ()), Err(Error::CycleDetected));
  }

  #[test]
  fn edge_to_missing_node_rejected() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    // A key for a slot this graph never allocated. A key from another graph
    // can alias a live slot here, so take one past the end instead.
    let mut larger = Graph::<&str, ()>::new();
    larger.add_node("x");
    let missing = larger.add_node("y");
    assert!(!graph.contains_node(missing));
    assert_eq!(graph.add_edge(a, missing, ()), Err(Error::NodeMissing));
    assert_eq!(graph.add_edge(missing, a, ()), Err(Error::NodeMissing));
    assert!(!graph.contains_edge(a, missing));
  }

  #[test]
  fn reaches_transitively() {
    let mut graph = Graph::new();
    let a = graph.add_node("a");
    let b = graph.add_node("b");
    let c = graph.add_node("c");
    graph.add_edge(a, b, ()).unwrap();
    graph.add_edge(b, c, ()).unwrap();
    assert!(graph.reaches(a, c));
    assert!(graph.reaches(a, a));
    assert!(!graph.reaches(c, a));
  }

  #[test]
  fn topological_order_puts_requirements_first() {
    let mut graph = Graph::new();
    let report = graph.add_node("report");
    let train = graph.add_node("train");
    let dataset = graph.add_node("dataset");
    graph.add_edge(report, train, ()).unwrap();
    graph.add_edge(train, dataset, ()).unwrap();
    let order = graph.topological_order();
    assert_eq!(order.len(), 3);
    assert!(position(&order, dataset) < position(&order, train));
    assert!(position(&order, train) < position(&order, report));
  }

  #[test]
  fn topological_order_is_deterministic() {
    let build = || {
      let mut graph = Graph::new();
      let a = graph.add_node("a");
      let b = graph.add_node("b");
      let c = graph.add_node("c");
      let d = graph.add_node("d");
      graph.add_edge(a, b, ()).unwrap();
      graph.add_edge(a, c, ()).unwrap();
      graph.add_edge(b, d, ()).unwrap();
      graph.add_edge(c, d, ()).unwrap();
      graph.topological_order().iter().map(|n| *graph.node_data(*n).unwrap()).collect::<Vec<_>>()
    };
    assert_eq!(build(), build());
  }

  #[test]
  fn diamond_order_is_valid() {
    let mut graph = Graph::new();
    let top = graph.add_node("top");
    let left = graph.add_node("left");
    let right = graph.add_node("right");
    let bottom = graph.add_node("bottom");
    graph.add_edge(top, left, ()).unwrap();
    graph.add_edge(top, right, ()).unwrap();
    graph.add_edge(left, bottom, ()).unwrap();
    graph.add_edge(right, bottom, ()).unwrap();
    let order = graph.topological_order();
    assert!(position(&order, bottom) < position(&order, left));
    assert!(position(&order, bottom) < position(&order, right));
    assert!(position(&order, left) < position(&order, top));
    assert!(position(&order, right) < position(&order, top));
  }
}
