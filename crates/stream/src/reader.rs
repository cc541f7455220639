//! Synchronous pull reader.
//!
//! Never waits on an external value: a pending resolution substitutes the
//! nearest enclosing boundary's fallback subtree permanently, or fails the
//! session when no boundary is open.

use crate::engine::{Core, Step, SuspendPop};
use crate::error::EngineError;
use crate::resolve::{Encoder, Resolver};
use crate::scope::SharedContext;
use crate::session::SessionId;
use std::sync::Arc;

/// Pull-based synchronous serializer for one session.
///
/// Output accumulates in one string buffer per open boundary depth; only the
/// depth-0 buffer is ever surrendered to the caller, so text inside a
/// still-open boundary can be discarded in favor of the fallback without
/// retracting anything already returned.
pub struct SyncReader<N, R, E> {
    core: Core<N, R, E>,
    /// `out[0]` is finalized root output; deeper entries belong to open
    /// boundaries, pushed and popped in lockstep with their frames.
    out: Vec<String>,
}

impl<N, R, E> SyncReader<N, R, E>
where
    R: Resolver<N>,
    E: Encoder<N>,
{
    /// Start a session rooted at `root`.
    pub fn new(root: N, resolver: R, encoder: E, context: SharedContext) -> Self {
        Self {
            core: Core::new(root, Arc::new(resolver), Arc::new(encoder), context),
            out: vec![String::new()],
        }
    }

    pub fn session(&self) -> SessionId {
        self.core.session()
    }

    /// Pull up to roughly `byte_budget` bytes of finalized output. Returns
    /// `None` once the session is exhausted; safe to call repeatedly after
    /// that. Any error aborts the session after restoring scopes and
    /// releasing the session id.
    pub fn read(&mut self, byte_budget: usize) -> Result<Option<String>, EngineError> {
        if self.core.is_destroyed() {
            return Ok(None);
        }
        if self.core.is_exhausted() && self.root_len() == 0 {
            self.destroy();
            return Ok(None);
        }
        if let Err(error) = self.drive(byte_budget) {
            self.destroy();
            return Err(error);
        }
        let chunk = match self.out.first_mut() {
            Some(root) => std::mem::take(root),
            None => String::new(),
        };
        if self.core.is_exhausted() {
            self.destroy();
        }
        Ok(Some(chunk))
    }

    /// Tear the session down early. Idempotent; restores every open scope
    /// and releases the session id exactly once.
    pub fn destroy(&mut self) {
        self.core.teardown();
    }

    fn root_len(&self) -> usize {
        self.out.first().map_or(0, String::len)
    }

    fn drive(&mut self, byte_budget: usize) -> Result<(), EngineError> {
        while self.root_len() < byte_budget {
            match self.core.step()? {
                Step::Done => break,
                Step::Emit(text) => self.emit(&text),
                Step::Closed {
                    closing,
                    was_boundary,
                } => {
                    if was_boundary {
                        let completed = self.pop_buffer()?;
                        self.emit(&completed);
                    }
                    self.emit(&closing);
                }
                Step::Boundary { children, fallback } => {
                    self.out.push(String::new());
                    self.core.push_boundary(children, fallback);
                    let open = self.core.encoder.boundary_open();
                    self.emit(open);
                }
                Step::Pending(future) => {
                    // This mode never waits; the future is dropped
                    // unobserved and the fallback is final.
                    drop(future);
                    if self.core.boundary_depth == 0 {
                        return Err(EngineError::UnhandledSuspension);
                    }
                    self.suspend()?;
                }
            }
        }
        Ok(())
    }

    /// Unwind to the nearest enclosing boundary, discard its buffered
    /// output, and substitute its fallback subtree.
    fn suspend(&mut self) -> Result<(), EngineError> {
        log::debug!(
            "stream: session {} suspended, substituting the nearest fallback",
            self.core.session()
        );
        loop {
            match self.core.pop_for_fallback()? {
                SuspendPop::Intermediate => {}
                SuspendPop::Boundary { fallback, closing } => {
                    self.pop_buffer()?;
                    let suspended = self.core.encoder.boundary_suspended();
                    self.emit(suspended);
                    self.core.push_fallback(fallback, closing);
                    return Ok(());
                }
            }
        }
    }

    fn emit(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(top) = self.out.last_mut() {
            top.push_str(text);
        }
    }

    /// Pop the buffer belonging to the boundary that just left the frame
    /// stack.
    fn pop_buffer(&mut self) -> Result<String, EngineError> {
        if self.out.len() < 2 {
            return Err(EngineError::Protocol(
                "boundary output buffer underflow".to_owned(),
            ));
        }
        Ok(self.out.pop().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;
    use serde_json::json;

    type Reader = SyncReader<TestNode, TestResolver, TestEncoder>;

    fn reader(root: TestNode, context: &SharedContext) -> Reader {
        SyncReader::new(root, TestResolver, TestEncoder, context.clone())
    }

    fn read_all(reader: &mut Reader) -> String {
        let mut out = String::new();
        while let Some(chunk) = reader.read(usize::MAX).expect("read succeeds") {
            out.push_str(&chunk);
        }
        out
    }

    #[test]
    fn markup_and_text_nest() {
        let context = SharedContext::new();
        let tree = elem(
            "div",
            vec![text("hello "), elem("b", vec![text("world")])],
        );
        let mut reader = reader(tree, &context);
        assert_eq!(read_all(&mut reader), "<div>hello <b>world</b></div>");
    }

    #[test]
    fn adjacent_text_siblings_get_a_separator() {
        let context = SharedContext::new();
        let tree = TestNode::Group(vec![text("left"), text("right")]);
        let mut reader = reader(tree, &context);
        assert_eq!(read_all(&mut reader), "left<!-- -->right");
    }

    #[test]
    fn markup_between_texts_needs_no_separator() {
        let context = SharedContext::new();
        let tree = TestNode::Group(vec![text("a"), elem("b", vec![]), text("c")]);
        let mut reader = reader(tree, &context);
        assert_eq!(read_all(&mut reader), "a<b></b>c");
    }

    #[test]
    fn empty_nodes_contribute_nothing() {
        let context = SharedContext::new();
        let tree = TestNode::Group(vec![TestNode::Nothing, text("x"), TestNode::Nothing]);
        let mut reader = reader(tree, &context);
        assert_eq!(read_all(&mut reader), "x");
    }

    #[test]
    fn chunking_is_budget_agnostic() {
        let context = SharedContext::new();
        let build = || {
            elem(
                "ul",
                (0..10)
                    .map(|index| elem("li", vec![TestNode::Text(format!("item {index}"))]))
                    .collect(),
            )
        };
        let mut single = reader(build(), &context);
        let full = read_all(&mut single);

        let mut chunked = reader(build(), &context);
        let mut joined = String::new();
        while let Some(chunk) = chunked.read(7).expect("read succeeds") {
            joined.push_str(&chunk);
        }
        assert_eq!(joined, full);
    }

    #[test]
    fn providers_shadow_and_restore() {
        let context = SharedContext::new();
        let scope = context.register_scope(json!("default"));
        let tree = TestNode::Provide {
            scope,
            value: json!("outer"),
            children: vec![
                TestNode::ReadScope(scope),
                TestNode::Provide {
                    scope,
                    value: json!("inner"),
                    children: vec![TestNode::ReadScope(scope)],
                },
            ],
        };
        let mut reader = reader(tree, &context);
        let session = reader.session();
        assert_eq!(read_all(&mut reader), "outer<!-- -->inner");
        assert_eq!(
            context.current(scope, session).expect("slot"),
            json!("default")
        );
    }

    #[test]
    fn suspension_without_boundary_is_fatal() {
        let context = SharedContext::new();
        let (_sender, node) = pending();
        let tree = elem("div", vec![node]);
        let mut reader = reader(tree, &context);
        assert!(matches!(
            reader.read(usize::MAX),
            Err(EngineError::UnhandledSuspension)
        ));
        // The session aborted; further pulls signal exhaustion.
        assert!(reader.read(usize::MAX).expect("read succeeds").is_none());
    }

    #[test]
    fn suspension_substitutes_the_fallback() {
        let context = SharedContext::new();
        let (_sender, node) = pending();
        let tree = elem(
            "div",
            vec![bound(
                vec![text("primary "), node, text("tail")],
                vec![text("fallback")],
            )],
        );
        let mut reader = reader(tree, &context);
        // Partial primary output is discarded, never surrendered.
        assert_eq!(
            read_all(&mut reader),
            "<div><!--$!-->fallback<!--/$--></div>"
        );
    }

    #[test]
    fn suspension_inside_a_fallback_escalates_outward() {
        let context = SharedContext::new();
        let (_first, inner_pending) = pending();
        let (_second, fallback_pending) = pending();
        let inner = bound(vec![inner_pending], vec![fallback_pending]);
        let outer = bound(vec![inner], vec![text("outer fallback")]);
        let mut reader = reader(outer, &context);
        assert_eq!(read_all(&mut reader), "<!--$!-->outer fallback<!--/$-->");
    }

    #[test]
    fn completed_boundary_keeps_its_sentinels() {
        let context = SharedContext::new();
        let tree = bound(vec![text("content")], vec![text("unused")]);
        let mut reader = reader(tree, &context);
        assert_eq!(read_all(&mut reader), "<!--$-->content<!--/$-->");
    }

    #[test]
    fn destroy_mid_traversal_restores_scopes_and_releases_the_id() {
        let context = SharedContext::new();
        let scope = context.register_scope(json!("default"));
        let tree = TestNode::Provide {
            scope,
            value: json!("override"),
            children: vec![text("aaaa"), text("bbbb")],
        };
        let mut first = reader(tree, &context);
        let session = first.session();
        // Small budget: the provider frame is still open when we stop.
        let chunk = first.read(1).expect("read succeeds").expect("chunk");
        assert_eq!(chunk, "aaaa");
        assert_eq!(
            context.current(scope, session).expect("slot"),
            json!("override")
        );

        first.destroy();
        first.destroy(); // idempotent
        assert_eq!(
            context.current(scope, session).expect("slot"),
            json!("default")
        );
        assert!(first.read(usize::MAX).expect("read succeeds").is_none());

        // The released id is available for the next session.
        let second = reader(text("x"), &context);
        assert_eq!(second.session(), session);
    }

    #[test]
    fn live_sessions_never_share_an_id() {
        let context = SharedContext::new();
        let first = reader(text("a"), &context);
        let second = reader(text("b"), &context);
        assert_ne!(first.session(), second.session());
    }

    #[test]
    fn broken_resolution_aborts_the_session() {
        let context = SharedContext::new();
        let tree = elem("div", vec![TestNode::Broken("bad component".to_owned())]);
        let mut reader = reader(tree, &context);
        assert!(matches!(
            reader.read(usize::MAX),
            Err(EngineError::Resolution(_))
        ));
    }
}

