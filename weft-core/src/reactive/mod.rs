//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and
//! watchers, all owned by a [`Scope`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a container for mutable state. When a signal's value is
//! read within a tracking context (a memo or watcher evaluation), the signal
//! automatically registers that node as a dependent. When the signal accepts
//! a new value, dependents are brought up to date before the write returns.
//!
//! ## Memos
//!
//! A [`Memo`] is a derived value that caches its result. It is computed once
//! at creation and re-evaluates only when one of its inputs actually
//! changes; an equality predicate prunes recomputations that produce the
//! same value. Memos are also writable: a direct write overrides the cached
//! value until an input next changes.
//!
//! ## Watchers
//!
//! A watcher (registered with [`Scope::watch`]) is a side-effecting
//! computation that re-runs whenever its tracked inputs change. A watcher
//! may return a teardown closure, invoked before the next run and at scope
//! disposal.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered by read capture: the scope keeps a stack of
//! currently-evaluating nodes, and every tracked read registers an edge
//! against the top of the stack. Updates propagate in a synchronous digest
//! that visits dirty nodes in creation-rank order, which is dependency
//! order, so each node runs at most once per pass and never observes a
//! half-updated graph. This approach ("automatic dependency tracking") is
//! the one popularized by SolidJS, Vue 3, and Leptos.

mod context;
mod effect;
mod memo;
mod scope;
mod signal;

pub use effect::{Cleanup, IntoCleanup};
pub use memo::Memo;
pub use scope::Scope;
pub use signal::Signal;

use std::rc::Rc;

/// Equality predicate attached to a node's value slot.
pub(crate) type EqualsFn<T> = Rc<dyn Fn(&T, &T) -> bool>;
