//! Reactive Scope
//!
//! The scope is the central coordinator that connects signals, memos, and
//! watchers. It owns the dependency graph, the tracking stack, and the
//! digest state, and it drives update propagation when a signal changes.
//!
//! # How It Works
//!
//! 1. Factory methods ([`Scope::signal`], [`Scope::derive`], [`Scope::watch`])
//!    allocate a node in the graph and hand back a typed handle.
//!
//! 2. When a memo or watcher evaluates, reads on this scope register
//!    dependencies against the node on top of the tracking stack.
//!
//! 3. When a signal (or memo override) accepts a new value, the node becomes
//!    a digest root. The digest marks every transitive dependent dirty and
//!    then reconciles them in creation-rank order, which is dependency
//!    order: memos recompute (or skip, when no input version moved), and
//!    watchers re-run their side effects.
//!
//! 4. Writes issued while the digest is draining, or while any evaluation is
//!    in progress, only enqueue further roots; the digest picks them up as
//!    an additional pass. The write call that started the digest returns
//!    once every pass has drained.
//!
//! # Glitch Freedom
//!
//! Within a pass, a node is only visited after every node it depends on has
//! been reconciled, so no watcher ever observes a half-updated graph. A memo
//! whose equality predicate reports "unchanged" does not bump its version,
//! which silently unmarks everything downstream that had no other changed
//! input.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::graph::scheduler::{DigestQueue, MAX_DIGEST_PASSES};
use crate::graph::{Cleanup, Graph, NodeBody, NodeId, NodeKind};
use crate::graph::node::{ComputedBody, EffectBody};

use super::context::{TrackingFrame, TrackingStack};
use super::effect::IntoCleanup;
use super::memo::Memo;
use super::signal::Signal;
use super::EqualsFn;

/// A container owning a graph of reactive nodes and its digest state.
///
/// All nodes created through a scope live until [`Scope::dispose`] (or the
/// scope's `Drop`); handles are tied to the scope that created them and must
/// not be mixed across scopes. The scope is single-threaded and is not
/// `Send` or `Sync` by construction.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

pub(crate) struct ScopeInner {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) tracking: RefCell<TrackingStack>,
    digest: RefCell<DigestQueue>,
    disposed: Cell<bool>,
}

/// What an evaluation body produced.
enum Outcome {
    /// Computed node: whether the equality predicate reported a change.
    Changed(bool),
    /// Effect node: teardown for the next run, if one was returned.
    Cleanup(Option<Cleanup>),
}

/// Guard that resets the digest state when the driver exits, panicking user
/// closures included, so a future write re-enters a clean scheduler.
struct DigestReset<'a> {
    scope: &'a ScopeInner,
}

impl Drop for DigestReset<'_> {
    fn drop(&mut self) {
        let mut digest = self.scope.digest.borrow_mut();
        let mut graph = self.scope.graph.borrow_mut();
        digest.finish(&mut graph);
    }
}

impl ScopeInner {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            tracking: RefCell::new(TrackingStack::new()),
            digest: RefCell::new(DigestQueue::new()),
            disposed: Cell::new(false),
        }
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Register a read of `id` against the currently-evaluating node, if any.
    ///
    /// Panics if `id` is itself being evaluated: that read would close a
    /// dependency cycle.
    pub(crate) fn track_read(&self, id: NodeId) {
        if self.disposed.get() {
            return;
        }
        let reader = {
            let tracking = self.tracking.borrow();
            if tracking.contains(id) {
                panic!(
                    "dependency cycle: node {} was read while it is being evaluated",
                    id.raw()
                );
            }
            tracking.current()
        };
        let Some(reader) = reader else { return };
        self.graph.borrow_mut().add_edge(id, reader);
    }

    /// A signal accepted a new value: stamp it and root a digest.
    pub(crate) fn source_changed(&self, id: NodeId) {
        if self.disposed.get() {
            return;
        }
        self.graph.borrow_mut().node_mut(id).bump_version();
        self.digest.borrow_mut().enqueue_root(id);
        self.request_flush();
    }

    /// A memo was overridden with an explicit value: stamp it, flag the
    /// override, and root a digest with the memo acting as a source.
    pub(crate) fn override_written(&self, id: NodeId) {
        if self.disposed.get() {
            return;
        }
        {
            let mut graph = self.graph.borrow_mut();
            let node = graph.node_mut(id);
            node.set_overridden(true);
            node.bump_version();
        }
        self.digest.borrow_mut().enqueue_root(id);
        self.request_flush();
    }

    /// Drain pending roots unless a digest is already running or an
    /// evaluation is in progress. In both deferred cases the enclosing
    /// driver picks the roots up once the current node finishes.
    pub(crate) fn request_flush(&self) {
        if self.disposed.get() {
            return;
        }
        if !self.digest.borrow().has_pending_roots() {
            return;
        }
        if self.tracking.borrow().is_active() {
            return;
        }
        if self.digest.borrow().is_running() {
            return;
        }
        self.flush();
    }

    /// The digest driver: repeat mark-and-propagate passes to quiescence.
    fn flush(&self) {
        if !self.digest.borrow_mut().start() {
            return;
        }
        let _reset = DigestReset { scope: self };
        while let Some(id) = self.next_dirty() {
            self.graph.borrow_mut().node_mut(id).mark_clean();
            self.process(id);
        }
    }

    /// Pop the lowest-rank dirty node, starting a new pass when the current
    /// one has drained and roots are still pending.
    fn next_dirty(&self) -> Option<NodeId> {
        let mut digest = self.digest.borrow_mut();
        if let Some(id) = digest.pop_next() {
            return Some(id);
        }
        let mut graph = self.graph.borrow_mut();
        if !digest.begin_pass(&mut graph) {
            trace!("digest settled after {} pass(es)", digest.passes());
            return None;
        }
        if digest.passes() > MAX_DIGEST_PASSES {
            drop(graph);
            drop(digest);
            panic!(
                "digest did not settle after {MAX_DIGEST_PASSES} passes; \
                 a watcher keeps producing writes that never reach a fixpoint"
            );
        }
        trace!("digest pass {}", digest.passes());
        digest.pop_next()
    }

    /// Reconcile one dirty node.
    fn process(&self, id: NodeId) {
        let (kind, inputs_changed) = {
            let graph = self.graph.borrow();
            (graph.node(id).kind(), graph.inputs_changed(id))
        };
        match kind {
            // Sources hold no computation; they only ever root a digest.
            NodeKind::Source => {}
            NodeKind::Computed => {
                if !inputs_changed {
                    // Every input was equality-pruned upstream; the cached
                    // value (override included) stays valid.
                    trace!("memo node {} inputs unchanged, skipping", id.raw());
                    return;
                }
                self.graph.borrow_mut().node_mut(id).set_overridden(false);
                let changed = self.evaluate(id);
                if changed {
                    self.graph.borrow_mut().node_mut(id).bump_version();
                    trace!("memo node {} recomputed to a new value", id.raw());
                }
            }
            NodeKind::Effect => {
                if !inputs_changed {
                    trace!("effect node {} inputs unchanged, skipping", id.raw());
                    return;
                }
                self.evaluate(id);
            }
        }
    }

    /// Run a node's body under a fresh tracking frame.
    ///
    /// The previous dependency set is detached first and diffed afterwards:
    /// dependencies not read this time drop their back-edge, and the
    /// versions of the live set are snapshotted for change detection. For
    /// watchers, the previously stored cleanup fires before the body and any
    /// newly returned cleanup is stored after it.
    ///
    /// Returns whether a computed node's value changed.
    fn evaluate(&self, id: NodeId) -> bool {
        let Some(body) = self.graph.borrow().node(id).body() else {
            return false;
        };
        if let Some(cleanup) = self.graph.borrow_mut().node_mut(id).take_cleanup() {
            self.untracked(cleanup);
        }
        let previous = self.graph.borrow_mut().begin_tracking(id);
        let frame = TrackingFrame::enter(self, id);
        let outcome = match &body {
            NodeBody::Computed(compute) => Outcome::Changed((&mut *compute.borrow_mut())()),
            NodeBody::Effect(run) => Outcome::Cleanup((&mut *run.borrow_mut())()),
        };
        drop(frame);

        let mut graph = self.graph.borrow_mut();
        graph.finish_tracking(id, previous);
        match outcome {
            Outcome::Changed(changed) => changed,
            Outcome::Cleanup(cleanup) => {
                graph.node_mut(id).set_cleanup(cleanup);
                false
            }
        }
    }

    /// Run `f` with the tracking stack suspended, so its reads register no
    /// dependencies.
    fn untracked(&self, f: impl FnOnce()) {
        let saved = self.tracking.borrow_mut().suspend();
        f();
        self.tracking.borrow_mut().resume(saved);
    }

    pub(crate) fn dependent_count(&self, id: NodeId) -> usize {
        self.graph.borrow().node(id).dependents().len()
    }
}

impl Scope {
    /// Create an empty scope.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner::new()),
        }
    }

    fn assert_live(&self) {
        assert!(
            !self.inner.disposed.get(),
            "cannot create nodes on a disposed scope"
        );
    }

    /// Create a signal holding `initial`, compared with `==` on writes.
    pub fn signal<T>(&self, initial: T) -> Signal<T>
    where
        T: PartialEq + 'static,
    {
        self.signal_with(initial, |previous: &T, next: &T| previous == next)
    }

    /// Create a signal with a custom equality predicate.
    ///
    /// A write whose `equals(current, next)` is true is a silent no-op: the
    /// value is not replaced and nothing downstream runs. The predicate is
    /// invoked exactly once per write.
    pub fn signal_with<T, E>(&self, initial: T, equals: E) -> Signal<T>
    where
        T: 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        self.assert_live();
        let id = self
            .inner
            .graph
            .borrow_mut()
            .insert(NodeKind::Source, None);
        Signal::new(Rc::clone(&self.inner), id, initial, Rc::new(equals))
    }

    /// Create a memo over `compute`, compared with `==` on recomputation.
    ///
    /// The computation runs once immediately, establishing the initial
    /// dependency set and cached value; subsequent reads are O(1) until an
    /// input changes.
    pub fn derive<T, F>(&self, compute: F) -> Memo<T>
    where
        T: PartialEq + 'static,
        F: FnMut() -> T + 'static,
    {
        self.derive_with(compute, |previous: &T, next: &T| previous == next)
    }

    /// Create a memo with a custom equality predicate.
    ///
    /// When a recomputation produces a value the predicate deems equal to
    /// the cached one, the memo keeps the old value and nothing downstream
    /// of it re-runs.
    pub fn derive_with<T, F, E>(&self, mut compute: F, equals: E) -> Memo<T>
    where
        T: 'static,
        F: FnMut() -> T + 'static,
        E: Fn(&T, &T) -> bool + 'static,
    {
        self.assert_live();
        let value: Rc<RefCell<Option<T>>> = Rc::new(RefCell::new(None));
        let equals: EqualsFn<T> = Rc::new(equals);

        let body: ComputedBody = {
            let value = Rc::clone(&value);
            let equals = Rc::clone(&equals);
            Rc::new(RefCell::new(move || {
                let next = compute();
                let changed = match value.borrow().as_ref() {
                    Some(previous) => !equals(previous, &next),
                    None => true,
                };
                if changed {
                    *value.borrow_mut() = Some(next);
                }
                changed
            }))
        };

        let id = self
            .inner
            .graph
            .borrow_mut()
            .insert(NodeKind::Computed, Some(NodeBody::Computed(body)));
        self.inner.evaluate(id);
        self.inner.request_flush();
        Memo::new(Rc::clone(&self.inner), id, value, equals)
    }

    /// Register a watcher.
    ///
    /// The effect runs once immediately under tracking and thereafter
    /// whenever one of its tracked inputs accepts a change. Its return value
    /// converts into an optional cleanup (see [`IntoCleanup`]) invoked
    /// before each re-run and at scope disposal. Watchers are not
    /// individually disposable; they live until the scope does.
    pub fn watch<F, C>(&self, mut effect: F)
    where
        F: FnMut() -> C + 'static,
        C: IntoCleanup,
    {
        self.assert_live();
        let body: EffectBody = Rc::new(RefCell::new(move || effect().into_cleanup()));
        let id = self
            .inner
            .graph
            .borrow_mut()
            .insert(NodeKind::Effect, Some(NodeBody::Effect(body)));
        self.inner.evaluate(id);
        self.inner.request_flush();
    }

    /// Release the scope.
    ///
    /// Every watcher's stored cleanup runs exactly once, in watcher creation
    /// order and without a tracking frame. Afterwards, reads on surviving
    /// handles return the last value, writes are silent no-ops, and factory
    /// calls panic.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let cleanups = {
            let mut graph = self.inner.graph.borrow_mut();
            let mut digest = self.inner.digest.borrow_mut();
            digest.finish(&mut graph);
            graph.teardown()
        };
        debug!("scope disposed, running {} cleanup(s)", cleanups.len());
        for cleanup in cleanups {
            self.inner.untracked(cleanup);
        }
    }

    /// Whether the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Total number of nodes the scope has created.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().len()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !self.inner.disposed.get() {
            self.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn watch_runs_once_at_declaration() {
        let scope = Scope::new();
        let runs = Rc::new(Cell::new(0));

        let counter = Rc::clone(&runs);
        scope.watch(move || counter.set(counter.get() + 1));

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn factories_allocate_nodes_in_creation_order() {
        let scope = Scope::new();
        let a = scope.signal(1);
        let b = scope.derive({
            let a = a.clone();
            move || a.get() + 1
        });

        assert!(a.id() < b.id());
        assert_eq!(scope.node_count(), 2);
    }

    #[test]
    fn dispose_is_idempotent() {
        let scope = Scope::new();
        let cleanups = Rc::new(Cell::new(0));

        let counter = Rc::clone(&cleanups);
        scope.watch(move || {
            let counter = Rc::clone(&counter);
            Some(move || counter.set(counter.get() + 1))
        });

        scope.dispose();
        scope.dispose();

        assert!(scope.is_disposed());
        assert_eq!(cleanups.get(), 1);
    }

    #[test]
    #[should_panic(expected = "disposed scope")]
    fn factory_calls_panic_after_disposal() {
        let scope = Scope::new();
        scope.dispose();
        let _ = scope.signal(0);
    }

    #[test]
    fn drop_runs_stored_cleanups() {
        let cleanups = Rc::new(Cell::new(0));
        {
            let scope = Scope::new();
            let counter = Rc::clone(&cleanups);
            scope.watch(move || {
                let counter = Rc::clone(&counter);
                Some(move || counter.set(counter.get() + 1))
            });
        }
        assert_eq!(cleanups.get(), 1);
    }
}
