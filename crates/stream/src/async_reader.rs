//! Asynchronous pull reader with per-depth output buffering and true resume.
//!
//! A pending resolution suspends only its own subtree: the engine keeps going
//! with the next sibling while the subtree's eventual text is captured as a
//! future in the current boundary depth's buffer. When a boundary closes, its
//! buffer collapses into a single future on the parent depth, so nesting is
//! transparent and sibling order is preserved no matter which siblings
//! suspend.

use crate::engine::{Core, Step};
use crate::error::EngineError;
use crate::resolve::{Encoder, NodeFuture, Resolver};
use crate::scope::{ScopeSnapshot, SharedContext};
use crate::session::SessionId;
use futures::future::{BoxFuture, try_join_all};
use std::collections::VecDeque;
use std::sync::Arc;

/// Text that is either already final or still being produced by a resumed
/// subtree.
type TextFuture = BoxFuture<'static, Result<String, EngineError>>;

enum Fragment {
    Literal(String),
    Pending(TextFuture),
}

/// Ordered mix of literal fragments and pending futures for one boundary
/// depth. Finalized exactly when its boundary frame pops.
#[derive(Default)]
struct FragmentBuffer {
    parts: VecDeque<Fragment>,
}

impl FragmentBuffer {
    /// Append literal text, coalescing with a trailing literal.
    fn push_text(&mut self, text: String) {
        if let Some(Fragment::Literal(last)) = self.parts.back_mut() {
            last.push_str(&text);
            return;
        }
        self.parts.push_back(Fragment::Literal(text));
    }

    fn push_future(&mut self, future: TextFuture) {
        self.parts.push_back(Fragment::Pending(future));
    }

    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Bytes available at the head without awaiting anything.
    fn resolved_head_len(&self) -> usize {
        match self.parts.front() {
            Some(Fragment::Literal(text)) => text.len(),
            _ => 0,
        }
    }

    fn all_literal(&self) -> bool {
        self.parts
            .iter()
            .all(|part| matches!(part, Fragment::Literal(_)))
    }

    /// Split into a layout (literals and holes, in order) plus the futures
    /// filling the holes.
    fn into_parts(self) -> (Vec<Piece>, Vec<TextFuture>) {
        let mut layout = Vec::with_capacity(self.parts.len());
        let mut futures = Vec::new();
        for part in self.parts {
            match part {
                Fragment::Literal(text) => layout.push(Piece::Literal(text)),
                Fragment::Pending(future) => {
                    layout.push(Piece::Hole);
                    futures.push(future);
                }
            }
        }
        (layout, futures)
    }
}

enum Piece {
    Literal(String),
    Hole,
}

/// Pull-based asynchronous serializer for one session.
pub struct AsyncReader<N, R, E> {
    core: Core<N, R, E>,
    /// One buffer per open boundary depth; index 0 is the root stream.
    buffers: Vec<FragmentBuffer>,
}

impl<N, R, E> AsyncReader<N, R, E>
where
    N: Send + 'static,
    R: Resolver<N> + Send + Sync + 'static,
    E: Encoder<N> + Send + Sync + 'static,
{
    /// Start a session rooted at `root`.
    pub fn new(root: N, resolver: R, encoder: E, context: SharedContext) -> Self {
        Self {
            core: Core::new(root, Arc::new(resolver), Arc::new(encoder), context),
            buffers: vec![FragmentBuffer::default()],
        }
    }

    /// Internal constructor for a resumed subtree session: private
    /// snapshot-seeded context, parent's session id, no id ownership.
    fn resumed(
        root: N,
        resolver: Arc<R>,
        encoder: Arc<E>,
        context: SharedContext,
        session: SessionId,
    ) -> Self {
        Self {
            core: Core::resumed(root, resolver, encoder, context, session),
            buffers: vec![FragmentBuffer::default()],
        }
    }

    pub fn session(&self) -> SessionId {
        self.core.session()
    }

    /// Pull up to roughly `byte_budget` bytes of output, awaiting the head
    /// of the stream only when nothing resolved is available yet. Returns
    /// `None` once the session is exhausted; safe to call repeatedly after
    /// that.
    pub async fn read(&mut self, byte_budget: usize) -> Result<Option<String>, EngineError> {
        if self.core.is_destroyed() {
            return Ok(None);
        }
        match self.read_inner(byte_budget).await {
            Ok(chunk) => Ok(chunk),
            Err(error) => {
                self.destroy();
                Err(error)
            }
        }
    }

    async fn read_inner(&mut self, byte_budget: usize) -> Result<Option<String>, EngineError> {
        self.drive(byte_budget)?;
        let mut out = String::new();
        loop {
            if out.len() >= byte_budget {
                break;
            }
            let Some(front) = self.root_buffer()?.parts.pop_front() else {
                break;
            };
            match front {
                Fragment::Literal(text) => out.push_str(&text),
                Fragment::Pending(future) => {
                    if out.is_empty() {
                        out.push_str(&future.await?);
                    } else {
                        // Keep it for the next pull; this one has text to
                        // hand back already.
                        self.root_buffer()?
                            .parts
                            .push_front(Fragment::Pending(future));
                        break;
                    }
                }
            }
        }
        if self.core.is_exhausted() && self.root_buffer()?.is_empty() {
            self.destroy();
            if out.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(out))
    }

    /// Tear the session down early. Idempotent; restores every open scope
    /// and releases the session id exactly once. Unawaited subtree futures
    /// are simply abandoned.
    pub fn destroy(&mut self) {
        self.core.teardown();
        self.buffers.clear();
    }

    /// Run the traversal loop without blocking, until the stack empties or
    /// enough resolved text sits at the head of the root buffer.
    fn drive(&mut self, byte_budget: usize) -> Result<(), EngineError> {
        while self.root_buffer()?.resolved_head_len() < byte_budget {
            match self.core.step()? {
                Step::Done => break,
                Step::Emit(text) => self.emit(text),
                Step::Closed {
                    closing,
                    was_boundary,
                } => {
                    if was_boundary {
                        self.finalize_boundary(closing)?;
                    } else {
                        self.emit(closing);
                    }
                }
                Step::Boundary { children, fallback } => {
                    self.buffers.push(FragmentBuffer::default());
                    self.core.push_boundary(children, fallback);
                    let open = self.core.encoder.boundary_open().to_owned();
                    self.emit(open);
                }
                Step::Pending(future) => self.capture(future)?,
            }
        }
        Ok(())
    }

    /// Capture a pending subtree as a future on the current depth's buffer
    /// and move on to the next sibling.
    fn capture(&mut self, future: NodeFuture<N>) -> Result<(), EngineError> {
        let snapshot = self.core.snapshot()?;
        let session = self.core.session();
        log::debug!(
            "stream: session {session} captured a pending subtree at depth {}",
            self.buffers.len() - 1
        );
        let resumed = resume_subtree(
            future,
            snapshot,
            session,
            Arc::clone(&self.core.resolver),
            Arc::clone(&self.core.encoder),
        );
        if let Some(top) = self.buffers.last_mut() {
            top.push_future(resumed);
        }
        Ok(())
    }

    /// Collapse the finished boundary's buffer into a single entry on the
    /// parent depth: a literal when everything resolved, otherwise one
    /// future that awaits the pending parts concurrently and joins them in
    /// original insertion order.
    fn finalize_boundary(&mut self, closing: String) -> Result<(), EngineError> {
        if self.buffers.len() < 2 {
            return Err(EngineError::Protocol(
                "boundary output buffer underflow".to_owned(),
            ));
        }
        let Some(buffer) = self.buffers.pop() else {
            return Err(EngineError::Protocol(
                "boundary output buffer underflow".to_owned(),
            ));
        };
        if buffer.all_literal() {
            let mut joined = String::new();
            for part in buffer.parts {
                if let Fragment::Literal(text) = part {
                    joined.push_str(&text);
                }
            }
            joined.push_str(&closing);
            self.emit(joined);
            return Ok(());
        }
        let (layout, futures) = buffer.into_parts();
        let joined: TextFuture = Box::pin(async move {
            let resolved = try_join_all(futures).await?;
            let mut filled = resolved.into_iter();
            let mut out = String::new();
            for piece in layout {
                match piece {
                    Piece::Literal(text) => out.push_str(&text),
                    Piece::Hole => {
                        if let Some(text) = filled.next() {
                            out.push_str(&text);
                        }
                    }
                }
            }
            out.push_str(&closing);
            Ok(out)
        });
        if let Some(top) = self.buffers.last_mut() {
            top.push_future(joined);
        }
        Ok(())
    }

    fn emit(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        if let Some(top) = self.buffers.last_mut() {
            top.push_text(text);
        }
    }

    fn root_buffer(&mut self) -> Result<&mut FragmentBuffer, EngineError> {
        self.buffers.first_mut().ok_or_else(|| {
            EngineError::Protocol("root output buffer missing".to_owned())
        })
    }
}

/// Build the future that resolves a suspended subtree: await the external
/// node, then run a brand-new session for just that subtree to full drain.
/// The resumed session owns its frame stack and a private context store
/// seeded from the suspension-time snapshot; it reuses the parent's session
/// id without ever releasing it.
fn resume_subtree<N, R, E>(
    node: NodeFuture<N>,
    snapshot: ScopeSnapshot,
    session: SessionId,
    resolver: Arc<R>,
    encoder: Arc<E>,
) -> TextFuture
where
    N: Send + 'static,
    R: Resolver<N> + Send + Sync + 'static,
    E: Encoder<N> + Send + Sync + 'static,
{
    Box::pin(async move {
        let node = node.await.map_err(EngineError::External)?;
        let context = SharedContext::from_snapshot(&snapshot, session);
        let mut reader = AsyncReader::resumed(node, resolver, encoder, context, session);
        let mut out = String::new();
        while let Some(chunk) = reader.read(usize::MAX).await? {
            out.push_str(&chunk);
        }
        Ok(out)
    })
}
