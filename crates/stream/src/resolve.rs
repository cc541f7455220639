//! Collaborator seams: node resolution and output encoding.

use crate::error::EngineError;
use crate::scope::{Ambient, ScopeId};
use futures::future::BoxFuture;
use serde_json::Value;

/// Eventual resolution of a node that depends on an unresolved external
/// value.
pub type NodeFuture<N> = BoxFuture<'static, anyhow::Result<N>>;

/// Form the engine can act on after resolving one node. Suspension is an
/// ordinary variant of this result, never an unwind.
pub enum Resolved<N> {
    /// A text leaf. The engine escapes it through the encoder before
    /// emission.
    Text(String),
    /// Contributes no output at all (a null-ish node).
    Empty,
    /// A primitive markup element. `element` carries identity and properties
    /// for the encoder; `children` are descended into on a new frame. An
    /// ambient override, when present, is entered for the subtree and
    /// restored when the element closes (a form control publishing its
    /// current selection, for example).
    Markup {
        element: N,
        children: Vec<N>,
        ambient: Option<(ScopeId, Value)>,
    },
    /// Expands into further children with no markup of its own: composites,
    /// fragment wrappers, forwarding nodes, lazy nodes.
    Children(Vec<N>),
    /// A provider node: override one scope for the subtree.
    Provider {
        scope: ScopeId,
        value: Value,
        children: Vec<N>,
    },
    /// A boundary pre-registering a fallback subtree for suspension.
    Boundary { children: Vec<N>, fallback: Vec<N> },
    /// The node depends on an external value that is not ready yet.
    Pending(NodeFuture<N>),
}

/// Converts one unresolved node into a [`Resolved`] form. A fatal resolution
/// failure is an `Err`; it aborts the owning session and is never retried.
pub trait Resolver<N> {
    fn resolve(&self, node: N, ambient: &Ambient<'_>) -> Result<Resolved<N>, EngineError>;
}

/// Owns the output grammar: markup for resolved elements, text escaping, and
/// the sentinel markers the engine interleaves with them.
pub trait Encoder<N> {
    /// Opening markup for an element. `is_root` is true for the first
    /// element the session emits.
    fn open_markup(&self, element: &N, ambient: &Ambient<'_>, is_root: bool) -> String;

    /// Closing marker for an element; empty when nothing needs to close.
    fn close_markup(&self, element: &N) -> String;

    /// Escape a text leaf for emission.
    fn escape_text(&self, text: &str) -> String;

    /// Separator between adjacent text siblings, preventing them from
    /// merging into one node on the consuming side.
    fn text_separator(&self) -> &'static str {
        "<!-- -->"
    }

    /// Sentinel opening a boundary's content.
    fn boundary_open(&self) -> &'static str {
        "<!--$-->"
    }

    /// Sentinel closing a boundary.
    fn boundary_close(&self) -> &'static str {
        "<!--/$-->"
    }

    /// Sentinel preceding fallback content substituted for a suspended
    /// subtree.
    fn boundary_suspended(&self) -> &'static str {
        "<!--$!-->"
    }
}
