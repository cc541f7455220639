//! Incremental tree-to-text serialization with suspension support.
//!
//! The engine walks a caller-defined node tree with an explicit, heap-resident
//! frame stack (no native recursion) and produces text through two pull-based
//! readers sharing identical traversal semantics:
//!
//! - [`SyncReader`] never waits: a node that depends on an unresolved external
//!   value either substitutes the nearest enclosing boundary's fallback subtree
//!   or fails with [`EngineError::UnhandledSuspension`].
//! - [`AsyncReader`] suspends only the affected subtree: its eventual output is
//!   captured as a future, buffered per boundary depth, and joined back into
//!   the stream in original sibling order.
//!
//! Node semantics live entirely in two collaborator seams: a [`Resolver`]
//! turns one node into a tagged [`Resolved`] form and an [`Encoder`] owns the
//! output grammar. Ambient values scoped to a subtree flow through a
//! [`SharedContext`] store keyed by `(ScopeId, SessionId)`, shared by all
//! concurrently live sessions.

mod async_reader;
mod engine;
mod error;
mod frame;
mod reader;
mod resolve;
mod scope;
mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use async_reader::AsyncReader;
pub use error::EngineError;
pub use reader::SyncReader;
pub use resolve::{Encoder, NodeFuture, Resolved, Resolver};
pub use scope::{Ambient, ScopeId, ScopeSnapshot, SharedContext};
pub use session::SessionId;
