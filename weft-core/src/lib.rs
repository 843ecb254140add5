//! Weft Core
//!
//! This crate provides a fine-grained reactive computation core:
//!
//! - Reactive primitives (signals, memos, watchers) with automatic
//!   dependency tracking
//! - A glitch-free, synchronous update digest over the dependency graph
//! - Equality-based change pruning and watcher cleanup lifecycle
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `reactive`: the user-facing primitives and the scope that owns them
//! - `graph`: the dependency graph, node model, and digest scheduling
//!
//! # Example
//!
//! ```
//! use weft_core::reactive::Scope;
//!
//! let scope = Scope::new();
//!
//! // Create a signal.
//! let count = scope.signal(0);
//!
//! // Create a derived value.
//! let doubled = scope.derive({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create a watcher.
//! scope.watch({
//!     let count = count.clone();
//!     let doubled = doubled.clone();
//!     move || println!("count: {}, doubled: {}", count.get(), doubled.get())
//! });
//!
//! // Update the signal. The memo recomputes and the watcher re-runs
//! // before `set` returns.
//! count.set(5);
//! assert_eq!(doubled.get(), 10);
//! ```

pub mod graph;
pub mod reactive;
