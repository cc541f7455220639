//! Work frames for the explicit traversal stack.

use crate::scope::ScopeId;

/// What kind of node a frame descends into, which decides the side effects
/// of its exit.
#[derive(Debug)]
pub(crate) enum FrameKind {
    /// Pure expansion: nothing to emit or restore on exit.
    Plain,
    /// A markup element; exiting emits the closing marker and, when the
    /// element published an ambient override, restores it.
    Element { ambient: Option<ScopeId> },
    /// A provider; exiting restores the overridden scope.
    Provider(ScopeId),
    /// A boundary; exiting finalizes its output buffer and emits the closing
    /// sentinel. Substituted for its fallback at most once, on first
    /// suspension, in the synchronous mode only.
    Boundary,
}

/// One level of the traversal: the remaining children of a node plus what to
/// do when they are exhausted. Frames form a LIFO stack that is the current
/// path from the tree root to the node being resolved; depth is bounded only
/// by tree nesting, never by the native call stack.
pub(crate) struct Frame<N> {
    pub(crate) kind: FrameKind,
    /// Children not yet resolved, stored in reverse so the next sibling is a
    /// `pop` away.
    remaining: Vec<N>,
    /// Emitted when the frame is exhausted.
    pub(crate) closing: String,
    /// Fallback subtree registered by a boundary, consumed on first
    /// suspension.
    pub(crate) fallback: Option<Vec<N>>,
}

impl<N> Frame<N> {
    pub(crate) fn new(kind: FrameKind, children: Vec<N>, closing: String) -> Self {
        let mut remaining = children;
        remaining.reverse();
        Self {
            kind,
            remaining,
            closing,
            fallback: None,
        }
    }

    pub(crate) fn boundary(children: Vec<N>, fallback: Vec<N>, closing: String) -> Self {
        let mut frame = Self::new(FrameKind::Boundary, children, closing);
        frame.fallback = Some(fallback);
        frame
    }

    /// Take the next child, or `None` once the frame is exhausted.
    pub(crate) fn next_child(&mut self) -> Option<N> {
        self.remaining.pop()
    }
}
