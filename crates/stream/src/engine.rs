//! Shared traversal state machine driven by both readers.
//!
//! One `Core` owns everything a session needs besides its output buffers:
//! the explicit frame stack, per-session scope bookkeeping, the session id,
//! and handles to the resolver/encoder collaborators. The readers differ only
//! in where emitted text goes and in what they do with a pending resolution.

use crate::error::EngineError;
use crate::frame::{Frame, FrameKind};
use crate::resolve::{Encoder, NodeFuture, Resolved, Resolver};
use crate::scope::{Ambient, ScopeSnapshot, ScopeStack, SharedContext};
use crate::session::SessionId;
use std::sync::Arc;

/// Outcome of one engine step, to be placed by the driving reader.
pub(crate) enum Step<N> {
    /// The frame stack is empty; the session is exhausted.
    Done,
    /// Text produced by the step: an escaped leaf, opening markup, or
    /// nothing. Goes to the reader's current output target.
    Emit(String),
    /// The top frame was exhausted and popped; scope side effects already
    /// ran. `was_boundary` tells the reader to finalize the matching output
    /// buffer before emitting `closing`.
    Closed { closing: String, was_boundary: bool },
    /// A boundary node resolved; the reader opens an output buffer before
    /// the frame is pushed.
    Boundary { children: Vec<N>, fallback: Vec<N> },
    /// The child depends on an unresolved external value.
    Pending(NodeFuture<N>),
}

/// What a single suspension pop uncovered, synchronous mode only.
pub(crate) enum SuspendPop<N> {
    /// A non-boundary frame between the suspension point and its boundary;
    /// its scopes were restored, its output is abandoned.
    Intermediate,
    /// The nearest enclosing boundary. Its fallback subtree replaces the
    /// primary content permanently.
    Boundary { fallback: Vec<N>, closing: String },
}

pub(crate) struct Core<N, R, E> {
    pub(crate) resolver: Arc<R>,
    pub(crate) encoder: Arc<E>,
    context: SharedContext,
    session: SessionId,
    /// Resumed sub-sessions borrow their parent's id and never release it.
    owns_id: bool,
    frames: Vec<Frame<N>>,
    scopes: ScopeStack,
    pub(crate) boundary_depth: usize,
    /// Set while the last emission was a text leaf, so the next adjacent
    /// text sibling gets a separator.
    previous_was_text: bool,
    emitted_root: bool,
    destroyed: bool,
}

impl<N, R, E> Core<N, R, E>
where
    R: Resolver<N>,
    E: Encoder<N>,
{
    /// Start an independent top-level session rooted at `root`.
    pub(crate) fn new(
        root: N,
        resolver: Arc<R>,
        encoder: Arc<E>,
        context: SharedContext,
    ) -> Self {
        let session = context.lock().begin_session();
        log::trace!("stream: session {session} started");
        Self {
            resolver,
            encoder,
            context,
            session,
            owns_id: true,
            frames: vec![Frame::new(FrameKind::Plain, vec![root], String::new())],
            scopes: ScopeStack::default(),
            boundary_depth: 0,
            previous_was_text: false,
            emitted_root: false,
            destroyed: false,
        }
    }

    /// Start a resumed session for a suspended subtree, under the parent's
    /// session id against a private snapshot-seeded store.
    pub(crate) fn resumed(
        root: N,
        resolver: Arc<R>,
        encoder: Arc<E>,
        context: SharedContext,
        session: SessionId,
    ) -> Self {
        log::trace!("stream: session {session} resumed for a suspended subtree");
        Self {
            resolver,
            encoder,
            context,
            session,
            owns_id: false,
            frames: vec![Frame::new(FrameKind::Plain, vec![root], String::new())],
            scopes: ScopeStack::default(),
            boundary_depth: 0,
            previous_was_text: false,
            emitted_root: true,
            destroyed: false,
        }
    }

    /// Advance the traversal by one unit of work.
    pub(crate) fn step(&mut self) -> Result<Step<N>, EngineError> {
        match self.frames.last_mut().and_then(Frame::next_child) {
            None if self.frames.is_empty() => Ok(Step::Done),
            None => self.exit_top(),
            Some(child) => self.resolve_child(child),
        }
    }

    /// Pop the exhausted top frame and run its exit side effects.
    fn exit_top(&mut self) -> Result<Step<N>, EngineError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(Step::Done);
        };
        let mut was_boundary = false;
        match frame.kind {
            FrameKind::Plain => {}
            FrameKind::Element { ambient: Some(scope) } | FrameKind::Provider(scope) => {
                let mut store = self.context.lock();
                self.scopes.exit(&mut store, self.session, scope)?;
            }
            FrameKind::Element { ambient: None } => {}
            FrameKind::Boundary => {
                self.boundary_depth = self.boundary_depth.saturating_sub(1);
                was_boundary = true;
            }
        }
        if !frame.closing.is_empty() {
            self.previous_was_text = false;
        }
        Ok(Step::Closed {
            closing: frame.closing,
            was_boundary,
        })
    }

    /// Resolve one child and translate the result into frame pushes and
    /// emitted text.
    fn resolve_child(&mut self, child: N) -> Result<Step<N>, EngineError> {
        let resolved = {
            let store = self.context.lock();
            let ambient = Ambient::new(&store, self.session);
            self.resolver.resolve(child, &ambient)?
        };
        match resolved {
            Resolved::Text(text) => {
                let mut piece = String::new();
                if self.previous_was_text {
                    piece.push_str(self.encoder.text_separator());
                }
                piece.push_str(&self.encoder.escape_text(&text));
                self.previous_was_text = true;
                Ok(Step::Emit(piece))
            }
            Resolved::Empty => Ok(Step::Emit(String::new())),
            Resolved::Children(children) => {
                self.frames
                    .push(Frame::new(FrameKind::Plain, children, String::new()));
                Ok(Step::Emit(String::new()))
            }
            Resolved::Provider {
                scope,
                value,
                children,
            } => {
                {
                    let mut store = self.context.lock();
                    self.scopes.enter(&mut store, self.session, scope, value)?;
                }
                self.frames
                    .push(Frame::new(FrameKind::Provider(scope), children, String::new()));
                Ok(Step::Emit(String::new()))
            }
            Resolved::Markup {
                element,
                children,
                ambient,
            } => {
                let open = {
                    let store = self.context.lock();
                    let view = Ambient::new(&store, self.session);
                    self.encoder.open_markup(&element, &view, !self.emitted_root)
                };
                let closing = self.encoder.close_markup(&element);
                let ambient_scope = match ambient {
                    Some((scope, value)) => {
                        let mut store = self.context.lock();
                        self.scopes.enter(&mut store, self.session, scope, value)?;
                        Some(scope)
                    }
                    None => None,
                };
                self.frames.push(Frame::new(
                    FrameKind::Element {
                        ambient: ambient_scope,
                    },
                    children,
                    closing,
                ));
                self.emitted_root = true;
                if !open.is_empty() {
                    self.previous_was_text = false;
                }
                Ok(Step::Emit(open))
            }
            Resolved::Boundary { children, fallback } => {
                Ok(Step::Boundary { children, fallback })
            }
            Resolved::Pending(future) => {
                self.previous_was_text = false;
                Ok(Step::Pending(future))
            }
        }
    }

    /// Push the frame for a boundary whose output buffer the reader already
    /// opened.
    pub(crate) fn push_boundary(&mut self, children: Vec<N>, fallback: Vec<N>) {
        self.frames.push(Frame::boundary(
            children,
            fallback,
            self.encoder.boundary_close().to_string(),
        ));
        self.boundary_depth += 1;
        self.previous_was_text = false;
    }

    /// Substitute a boundary's fallback subtree after a synchronous
    /// suspension. The frame is plain: a second suspension inside the
    /// fallback escalates to the next enclosing boundary.
    pub(crate) fn push_fallback(&mut self, fallback: Vec<N>, closing: String) {
        self.frames
            .push(Frame::new(FrameKind::Plain, fallback, closing));
        self.previous_was_text = false;
    }

    /// Pop one frame on the way from a suspension point to the nearest
    /// enclosing boundary, restoring any scope the frame owned.
    pub(crate) fn pop_for_fallback(&mut self) -> Result<SuspendPop<N>, EngineError> {
        let Some(mut frame) = self.frames.pop() else {
            return Err(EngineError::UnhandledSuspension);
        };
        match frame.kind {
            FrameKind::Element { ambient: Some(scope) } | FrameKind::Provider(scope) => {
                let mut store = self.context.lock();
                self.scopes.exit(&mut store, self.session, scope)?;
                Ok(SuspendPop::Intermediate)
            }
            FrameKind::Plain | FrameKind::Element { ambient: None } => {
                Ok(SuspendPop::Intermediate)
            }
            FrameKind::Boundary => {
                self.boundary_depth = self.boundary_depth.saturating_sub(1);
                Ok(SuspendPop::Boundary {
                    fallback: frame.fallback.take().unwrap_or_default(),
                    closing: frame.closing,
                })
            }
        }
    }
}

impl<N, R, E> Core<N, R, E> {
    pub(crate) fn session(&self) -> SessionId {
        self.session
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }

    /// Clone the session's current ambient values, for seeding a resumed
    /// session.
    pub(crate) fn snapshot(&self) -> Result<ScopeSnapshot, EngineError> {
        self.context.lock().snapshot(self.session)
    }

    /// Drain open scopes and release the session id. Idempotent; runs on
    /// exhaustion, on explicit destruction, and on every error path.
    pub(crate) fn teardown(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.frames.clear();
        {
            let mut store = self.context.lock();
            self.scopes.drain(&mut store, self.session);
            if self.owns_id {
                if let Err(error) = store.end_session(self.session) {
                    log::warn!("stream: releasing session {} failed: {error}", self.session);
                }
            }
        }
        log::trace!("stream: session {} torn down", self.session);
    }
}

impl<N, R, E> Drop for Core<N, R, E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
