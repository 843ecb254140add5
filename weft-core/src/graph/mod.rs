//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between reactive values and computations.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent signals, memos, or watchers
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! When a signal changes, the digest walks the graph to find all affected
//! nodes and marks them dirty. Version counters on each node then decide
//! which dirty nodes actually need to recompute: a node whose inputs all
//! report the version it last observed is skipped outright, which is what
//! keeps equality-filtered changes from fanning out downstream.
//!
//! # Design Decisions
//!
//! 1. The graph is centralized in a creation-ordered arena rather than
//!    distributed linked lists. Node ids double as creation ranks, and
//!    creation rank is a valid topological order because a computation can
//!    only read nodes that already existed when it first evaluated.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are
//!    maintained so the digest can traverse in either direction. The two
//!    directions are kept symmetric by every edge operation.

pub mod node;
pub(crate) mod scheduler;

pub use node::{Cleanup, NodeId, NodeKind};
pub(crate) use node::{Node, NodeBody};

/// Central store for every node a scope owns.
///
/// Nodes are never removed individually; the arena lives until the scope is
/// disposed, at which point `teardown` guts every node in place.
pub(crate) struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a node to the graph, assigning the next creation rank.
    pub(crate) fn insert(&mut self, kind: NodeKind, body: Option<NodeBody>) -> NodeId {
        let id = NodeId::from_index(self.nodes.len());
        self.nodes.push(Node::new(kind, body));
        id
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Record that `reader` read `source` during its current evaluation.
    ///
    /// Both edge directions are updated; a repeated read is a no-op, so the
    /// same dependent appears at most once on any node.
    pub(crate) fn add_edge(&mut self, source: NodeId, reader: NodeId) {
        if self.nodes[reader.index()].add_dependency(source) {
            self.nodes[source.index()].add_dependent(reader);
        }
    }

    /// Detach `id`'s dependency set ahead of a re-evaluation, returning the
    /// previous set for the post-run diff.
    pub(crate) fn begin_tracking(&mut self, id: NodeId) -> Vec<NodeId> {
        self.nodes[id.index()].take_dependencies()
    }

    /// Reconcile edges after `id` re-evaluated: dependencies that were not
    /// read this time drop their back-edge, and the versions of the live
    /// dependency set are recorded for change detection.
    pub(crate) fn finish_tracking(&mut self, id: NodeId, previous: Vec<NodeId>) {
        let current = self.nodes[id.index()].dependencies().to_vec();
        for dep in previous {
            if !current.contains(&dep) {
                self.nodes[dep.index()].remove_dependent(id);
            }
        }
        let versions = current
            .iter()
            .map(|dep| self.nodes[dep.index()].version())
            .collect();
        self.nodes[id.index()].set_input_versions(versions);
    }

    /// Whether any of `id`'s dependencies carries a version newer than the
    /// one `id` observed at the end of its last evaluation.
    pub(crate) fn inputs_changed(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.dependencies().len() != node.input_versions().len() {
            // An aborted evaluation left no version snapshot; re-run.
            return true;
        }
        node.dependencies()
            .iter()
            .zip(node.input_versions())
            .any(|(dep, seen)| self.node(*dep).version() != *seen)
    }

    /// Clear the dirty flag on every node.
    pub(crate) fn clear_dirty(&mut self) {
        for node in &mut self.nodes {
            node.mark_clean();
        }
    }

    /// Gut every node at scope disposal, collecting the stored watcher
    /// cleanups in creation order.
    pub(crate) fn teardown(&mut self) -> Vec<Cleanup> {
        let mut cleanups = Vec::new();
        for node in &mut self.nodes {
            if let Some(cleanup) = node.teardown() {
                cleanups.push(cleanup);
            }
        }
        cleanups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn insert_assigns_creation_order() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Source, None);
        let b = graph.insert(NodeKind::Computed, None);

        assert!(a < b);
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn add_edge_is_symmetric_and_deduplicated() {
        let mut graph = Graph::new();
        let source = graph.insert(NodeKind::Source, None);
        let reader = graph.insert(NodeKind::Effect, None);

        graph.add_edge(source, reader);
        graph.add_edge(source, reader);

        assert_eq!(graph.node(source).dependents(), &[reader]);
        assert_eq!(graph.node(reader).dependencies(), &[source]);
    }

    #[test]
    fn finish_tracking_prunes_dropped_dependencies() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Source, None);
        let b = graph.insert(NodeKind::Source, None);
        let reader = graph.insert(NodeKind::Effect, None);

        graph.add_edge(a, reader);
        graph.add_edge(b, reader);

        // Re-evaluate with only `b` read this time.
        let previous = graph.begin_tracking(reader);
        graph.add_edge(b, reader);
        graph.finish_tracking(reader, previous);

        assert!(graph.node(a).dependents().is_empty());
        assert_eq!(graph.node(b).dependents(), &[reader]);
        assert_eq!(graph.node(reader).dependencies(), &[b]);
    }

    #[test]
    fn inputs_changed_compares_versions() {
        let mut graph = Graph::new();
        let source = graph.insert(NodeKind::Source, None);
        let reader = graph.insert(NodeKind::Effect, None);

        let previous = graph.begin_tracking(reader);
        graph.add_edge(source, reader);
        graph.finish_tracking(reader, previous);
        assert!(!graph.inputs_changed(reader));

        graph.node_mut(source).bump_version();
        assert!(graph.inputs_changed(reader));

        let previous = graph.begin_tracking(reader);
        graph.add_edge(source, reader);
        graph.finish_tracking(reader, previous);
        assert!(!graph.inputs_changed(reader));
    }

    #[test]
    fn teardown_collects_cleanups_in_creation_order() {
        let mut graph = Graph::new();
        let first = graph.insert(NodeKind::Effect, None);
        let second = graph.insert(NodeKind::Effect, None);

        let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&order);
        graph
            .node_mut(first)
            .set_cleanup(Some(Box::new(move || log.borrow_mut().push("first"))));
        let log = Rc::clone(&order);
        graph
            .node_mut(second)
            .set_cleanup(Some(Box::new(move || log.borrow_mut().push("second"))));

        for cleanup in graph.teardown() {
            cleanup();
        }
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }
}
