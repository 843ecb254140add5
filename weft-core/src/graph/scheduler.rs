//! Digest Scheduler
//!
//! The scheduler tracks which nodes a digest still has to visit and in what
//! order. It ensures that dependencies are always reconciled before their
//! dependents.
//!
//! # Algorithm
//!
//! A digest is a sequence of passes. Each pass:
//!
//! 1. Drains the pending roots (nodes whose value just changed externally)
//! 2. Marks every transitively reachable dependent as dirty
//! 3. Hands dirty nodes back to the scope in ascending creation rank
//!
//! Creation rank is a valid topological order (see the module docs of
//! [`crate::graph`]), so an ordered set of dirty ids replaces an explicit
//! topological sort. Writes issued while a pass is draining enqueue new
//! roots; the digest then runs another pass, repeating until no roots remain
//! or [`MAX_DIGEST_PASSES`] is exceeded.

use std::collections::BTreeSet;
use std::mem;

use super::{Graph, NodeId};

/// Hard bound on mark-and-propagate passes within a single digest.
///
/// A digest that keeps accumulating roots past this bound is a watcher storm
/// (watchers writing values that never reach a fixpoint under the equality
/// predicates) and is aborted with a panic.
pub(crate) const MAX_DIGEST_PASSES: usize = 100;

/// Per-digest bookkeeping: pending roots, the ordered dirty set, and pass
/// accounting.
pub(crate) struct DigestQueue {
    /// Nodes whose value changed externally, in write order.
    roots: Vec<NodeId>,

    /// Dirty nodes awaiting processing; iterated smallest rank first.
    dirty: BTreeSet<NodeId>,

    /// Whether a digest is currently draining. Writes observed while this is
    /// set only enqueue roots instead of starting a nested digest.
    running: bool,

    /// Passes begun in the current digest.
    passes: usize,
}

impl DigestQueue {
    pub(crate) fn new() -> Self {
        Self {
            roots: Vec::new(),
            dirty: BTreeSet::new(),
            running: false,
            passes: 0,
        }
    }

    /// Queue a node whose value just changed as a root of the next pass.
    pub(crate) fn enqueue_root(&mut self, id: NodeId) {
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub(crate) fn has_pending_roots(&self) -> bool {
        !self.roots.is_empty()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    /// Claim the digest for the calling driver. Returns false if a digest is
    /// already draining.
    pub(crate) fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        true
    }

    pub(crate) fn passes(&self) -> usize {
        self.passes
    }

    /// Mark phase: drain the pending roots and mark every transitively
    /// reachable dependent dirty. Returns false when no roots were pending.
    pub(crate) fn begin_pass(&mut self, graph: &mut Graph) -> bool {
        if self.roots.is_empty() {
            return false;
        }
        self.passes += 1;
        for root in mem::take(&mut self.roots) {
            let mut frontier = graph.node(root).dependents().to_vec();
            while let Some(id) = frontier.pop() {
                let node = graph.node_mut(id);
                if node.is_dirty() {
                    // Its dependents were already marked when it was.
                    continue;
                }
                node.mark_dirty();
                self.dirty.insert(id);
                frontier.extend_from_slice(graph.node(id).dependents());
            }
        }
        true
    }

    /// Next dirty node in topological order.
    pub(crate) fn pop_next(&mut self) -> Option<NodeId> {
        self.dirty.pop_first()
    }

    /// End-of-digest reset: every dirty flag is cleared so a future write
    /// re-enters a clean scheduler, even when a pass was cut short by a
    /// panicking user closure.
    pub(crate) fn finish(&mut self, graph: &mut Graph) {
        graph.clear_dirty();
        self.dirty.clear();
        self.roots.clear();
        self.passes = 0;
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn chain() -> (Graph, NodeId, NodeId, NodeId) {
        // source -> computed -> effect
        let mut graph = Graph::new();
        let source = graph.insert(NodeKind::Source, None);
        let computed = graph.insert(NodeKind::Computed, None);
        let effect = graph.insert(NodeKind::Effect, None);
        graph.add_edge(source, computed);
        graph.add_edge(computed, effect);
        (graph, source, computed, effect)
    }

    #[test]
    fn begin_pass_marks_transitive_dependents() {
        let (mut graph, source, computed, effect) = chain();
        let mut queue = DigestQueue::new();

        queue.enqueue_root(source);
        assert!(queue.begin_pass(&mut graph));

        assert!(!graph.node(source).is_dirty());
        assert!(graph.node(computed).is_dirty());
        assert!(graph.node(effect).is_dirty());
    }

    #[test]
    fn dirty_nodes_pop_in_creation_order() {
        let (mut graph, source, computed, effect) = chain();
        let mut queue = DigestQueue::new();

        queue.enqueue_root(source);
        queue.begin_pass(&mut graph);

        assert_eq!(queue.pop_next(), Some(computed));
        assert_eq!(queue.pop_next(), Some(effect));
        assert_eq!(queue.pop_next(), None);
    }

    #[test]
    fn roots_are_deduplicated() {
        let (mut graph, source, computed, _) = chain();
        let mut queue = DigestQueue::new();

        queue.enqueue_root(source);
        queue.enqueue_root(source);
        queue.begin_pass(&mut graph);

        assert_eq!(queue.pop_next(), Some(computed));
    }

    #[test]
    fn begin_pass_without_roots_reports_settled() {
        let mut graph = Graph::new();
        let mut queue = DigestQueue::new();
        assert!(!queue.begin_pass(&mut graph));
        assert_eq!(queue.passes(), 0);
    }

    #[test]
    fn finish_clears_dirty_flags_and_claims() {
        let (mut graph, source, computed, effect) = chain();
        let mut queue = DigestQueue::new();

        assert!(queue.start());
        assert!(!queue.start());

        queue.enqueue_root(source);
        queue.begin_pass(&mut graph);
        queue.finish(&mut graph);

        assert!(!graph.node(computed).is_dirty());
        assert!(!graph.node(effect).is_dirty());
        assert!(!queue.is_running());
        assert_eq!(queue.passes(), 0);
        assert!(queue.start());
    }
}
